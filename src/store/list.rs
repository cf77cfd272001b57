//! List Module
//!
//! Filtering, projection, ordering and pagination of cached objects.

use std::cmp::Ordering;

use serde::Serialize;

use crate::entity::Entity;

/// Keeps objects for which it returns true.
pub type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
/// Projects a surviving object before it is sorted and returned.
pub type Formatter<T> = Box<dyn Fn(T) -> T + Send + Sync>;
/// Orders two rows.
pub type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

// == List Input ==
/// Parameters of [`GenericStore::list`](crate::store::GenericStore::list).
///
/// Every field is optional; `Default` lists everything in the default order.
pub struct ListInput<T> {
    pub predicate: Option<Predicate<T>>,
    pub format: Option<Formatter<T>>,
    pub page_size: usize,
    /// 1-based
    pub page_number: usize,
    pub less: Option<Comparator<T>>,
}

impl<T> Default for ListInput<T> {
    fn default() -> Self {
        Self {
            predicate: None,
            format: None,
            page_size: 0,
            page_number: 0,
            less: None,
        }
    }
}

impl<T> ListInput<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn predicate(mut self, f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Box::new(f));
        self
    }

    pub fn format(mut self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.format = Some(Box::new(f));
        self
    }

    pub fn page(mut self, page_number: usize, page_size: usize) -> Self {
        self.page_number = page_number;
        self.page_size = page_size;
        self
    }

    pub fn less(mut self, f: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        self.less = Some(Box::new(f));
        self
    }
}

// == List Output ==
#[derive(Debug, Clone, Serialize)]
pub struct ListOutput<T> {
    pub rows: Vec<T>,
    /// Filtered count before pagination
    pub total_size: usize,
}

/// Orders by create time, then update time. Objects without base info
/// compare equal here and fall through to the key tiebreak.
pub(crate) fn default_less<T: Entity>(a: &T, b: &T) -> Ordering {
    let times = |obj: &T| {
        obj.base_info()
            .map(|info| (info.create_time, info.update_time))
            .unwrap_or_default()
    };
    times(a).cmp(&times(b))
}

/// Sorts `(key, row)` pairs with `less`, breaking ties by key so repeated
/// calls always agree.
pub(crate) fn sort_rows<T>(rows: &mut [(String, T)], less: &dyn Fn(&T, &T) -> Ordering) {
    rows.sort_by(|(ka, a), (kb, b)| less(a, b).then_with(|| ka.cmp(kb)));
}

// == Paginate ==
/// Returns page `page_number` (1-based) of `page_size` rows.
///
/// Pagination applies only when both values are positive. An offset past
/// the end yields an empty page.
pub fn paginate<T>(rows: Vec<T>, page_number: usize, page_size: usize) -> Vec<T> {
    if page_size == 0 || page_number == 0 {
        return rows;
    }

    let skip = (page_number - 1).saturating_mul(page_size);
    if skip >= rows.len() {
        return Vec::new();
    }

    rows.into_iter().skip(skip).take(page_size).collect()
}
