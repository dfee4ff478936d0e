//! Best-first search queue and partial heap-sort ranking.
//!
//! [`SearchQueue`] drives tree expansion: the entry with the highest priority
//! (most promising unexplored node) is always popped first. [`heap_sort`]
//! ranks the final candidate set; it extracts only the top `last` elements,
//! leaving the rest of the array unsorted, since only the nearest few matter.

use std::collections::BinaryHeap;

use crate::node::NodeId;

/// A prioritized node in the best-first frontier.
#[derive(Debug, Clone, Copy)]
pub struct QueueEntry {
    pub priority: f32,
    pub id: NodeId,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority pops first. total_cmp is NaN-safe.
        self.priority.total_cmp(&other.priority)
    }
}

/// Max-priority queue over `(priority, node id)` pairs.
#[derive(Debug, Default)]
pub struct SearchQueue {
    heap: BinaryHeap<QueueEntry>,
}

impl SearchQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, priority: f32, id: NodeId) {
        self.heap.push(QueueEntry { priority, id });
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    #[must_use]
    pub fn top(&self) -> Option<&QueueEntry> {
        self.heap.peek()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// A `(id, value)` pair ranked by [`heap_sort`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked {
    pub id: i64,
    pub value: f32,
}

/// Sort direction for [`heap_sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Partial heap-sort: after the call, the *tail* `last` positions of `array`
/// hold the extracted elements.
///
/// - `Order::Asc` extracts the `last` largest values; reading the tail
///   forward gives them in ascending order.
/// - `Order::Desc` extracts the `last` smallest values; reading the tail
///   *backward* (from the end) gives them in ascending order.
///
/// With `last >= array.len()` the whole array is sorted.
pub fn heap_sort(array: &mut [Ranked], order: Order, last: usize) {
    let heapify = match order {
        Order::Asc => max_heapify,
        Order::Desc => min_heapify,
    };

    // Build the heap.
    for root in (0..array.len() / 2).rev() {
        heapify(array, root, array.len());
    }

    // Extract the top into the tail, stopping once `last` slots are filled.
    let bp = array.len().saturating_sub(last);
    for length in (2..=array.len()).rev() {
        let last_index = length - 1;
        array.swap(0, last_index);
        heapify(array, 0, last_index);
        if last_index == bp {
            break;
        }
    }
}

fn max_heapify(array: &mut [Ranked], root: usize, length: usize) {
    let mut max = root;
    let l = root * 2 + 1;
    let r = l + 1;

    if l < length && array[l].value > array[max].value {
        max = l;
    }
    if r < length && array[r].value > array[max].value {
        max = r;
    }
    if max != root {
        array.swap(root, max);
        max_heapify(array, max, length);
    }
}

fn min_heapify(array: &mut [Ranked], root: usize, length: usize) {
    let mut min = root;
    let l = root * 2 + 1;
    let r = l + 1;

    if l < length && array[l].value < array[min].value {
        min = l;
    }
    if r < length && array[r].value < array[min].value {
        min = r;
    }
    if min != root {
        array.swap(root, min);
        min_heapify(array, min, length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(values: &[f32]) -> Vec<Ranked> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| Ranked {
                id: i as i64,
                value,
            })
            .collect()
    }

    #[test]
    fn queue_pops_highest_priority_first() {
        let mut q = SearchQueue::new();
        q.push(1.0, 10);
        q.push(f32::INFINITY, 20);
        q.push(-3.0, 30);

        assert_eq!(q.top().unwrap().id, 20);
        assert_eq!(q.pop().unwrap().id, 20);
        assert_eq!(q.pop().unwrap().id, 10);
        assert_eq!(q.pop().unwrap().id, 30);
        assert!(q.pop().is_none());
    }

    #[test]
    fn full_ascending_sort() {
        let mut a = ranked(&[3.0, 1.0, 4.0, 1.5, 5.0, 9.0, 2.6]);
        let n = a.len();
        heap_sort(&mut a, Order::Asc, n);
        let values: Vec<f32> = a.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 1.5, 2.6, 3.0, 4.0, 5.0, 9.0]);
    }

    #[test]
    fn full_descending_sort() {
        let mut a = ranked(&[3.0, 1.0, 4.0, 1.5, 5.0]);
        let n = a.len();
        heap_sort(&mut a, Order::Desc, n);
        let values: Vec<f32> = a.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![5.0, 4.0, 3.0, 1.5, 1.0]);
    }

    #[test]
    fn partial_desc_extracts_smallest_into_tail() {
        let mut a = ranked(&[3.0, 1.0, 4.0, 1.5, 5.0, 9.0, 2.6]);
        let n = 3;
        heap_sort(&mut a, Order::Desc, n);

        let len = a.len();
        let tail: Vec<f32> = (0..n).map(|i| a[len - 1 - i].value).collect();
        assert_eq!(tail, vec![1.0, 1.5, 2.6]);
    }

    #[test]
    fn partial_asc_extracts_largest_into_tail() {
        let mut a = ranked(&[3.0, 1.0, 4.0, 1.5, 5.0, 9.0, 2.6]);
        let n = 2;
        heap_sort(&mut a, Order::Asc, n);

        let len = a.len();
        let tail: Vec<f32> = a[len - n..].iter().map(|r| r.value).collect();
        assert_eq!(tail, vec![5.0, 9.0]);
    }

    #[test]
    fn sorting_single_element_is_a_no_op() {
        let mut a = ranked(&[1.0]);
        heap_sort(&mut a, Order::Desc, 1);
        assert_eq!(a[0].value, 1.0);
    }
}
