//! Streaming reconstruction of nested records from flat join rows.
//!
//! A relational outer join yields one row per `(parent, child)` pair, with
//! the child portion absent when a parent has no children. [`RowGrouping`]
//! folds such rows back into one [`GroupedRecord`] per parent, carrying the
//! parent's children as a named list.
//!
//! # Precondition
//!
//! **Rows must already be ordered by the parent key** (for example with an
//! `ORDER BY` on the key in the producing query). Grouping is a single linear
//! pass that only compares each row's key with the previous one; it does not
//! sort or buffer by key. Out-of-order input is not detected and yields
//! several records for the same logical parent.

use std::marker::PhantomData;

use serde::ser::Error as _;
use serde::{Serialize, Serializer};

/// A parent value plus, when a child extractor was configured, its children.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedRecord<P, C> {
    pub parent: P,
    children: Option<NamedChildren<C>>,
}

#[derive(Debug, Clone, PartialEq)]
struct NamedChildren<C> {
    name: &'static str,
    items: Vec<C>,
}

impl<P, C> GroupedRecord<P, C> {
    /// The accumulated children, or `None` when grouping had no child
    /// extractor.
    pub fn children(&self) -> Option<&[C]> {
        self.children.as_ref().map(|c| c.items.as_slice())
    }

    /// Attribute name the children serialize under.
    pub fn children_name(&self) -> Option<&'static str> {
        self.children.as_ref().map(|c| c.name)
    }

    pub fn into_parts(self) -> (P, Option<Vec<C>>) {
        (self.parent, self.children.map(|c| c.items))
    }
}

/// Serializes as the parent's JSON object with the child list added under
/// its configured name. The parent must serialize to a map.
impl<P: Serialize, C: Serialize> Serialize for GroupedRecord<P, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut value = serde_json::to_value(&self.parent).map_err(S::Error::custom)?;
        if let Some(children) = &self.children {
            let items = serde_json::to_value(&children.items).map_err(S::Error::custom)?;
            let Some(map) = value.as_object_mut() else {
                return Err(S::Error::custom("grouped parent must serialize to a map"));
            };
            map.insert(children.name.to_string(), items);
        }
        value.serialize(serializer)
    }
}

/// Child extractor used when grouping collects no children.
pub type NoChildren<R> = fn(&R) -> Option<()>;

/// Grouping configuration: key, parent and optional child extractors over
/// rows of type `R`.
///
/// ```
/// use archdiffer_core::grouping::RowGrouping;
///
/// let rows = vec![(1, "P1", Some("C1")), (1, "P1", Some("C2")), (2, "P2", None)];
/// let groups: Vec<_> = RowGrouping::new(|r: &(u32, &'static str, Option<&'static str>)| r.0, |r| r.1)
///     .with_children("children", |r| r.2)
///     .group(rows)
///     .collect();
///
/// assert_eq!(groups.len(), 2);
/// assert_eq!(groups[0].children(), Some(&["C1", "C2"][..]));
/// assert_eq!(groups[1].children(), Some(&[][..]));
/// ```
pub struct RowGrouping<R, FK, FP, FC> {
    key_of: FK,
    parent_of: FP,
    children: Option<(&'static str, FC)>,
    _rows: PhantomData<fn(&R)>,
}

impl<R, FK, FP> RowGrouping<R, FK, FP, NoChildren<R>> {
    /// Group by `key_of`, building each output record with `parent_of` from
    /// the first row of its group.
    pub fn new<K, P>(key_of: FK, parent_of: FP) -> Self
    where
        FK: FnMut(&R) -> K,
        FP: FnMut(&R) -> P,
    {
        Self {
            key_of,
            parent_of,
            children: None,
            _rows: PhantomData,
        }
    }
}

impl<R, FK, FP, FC> RowGrouping<R, FK, FP, FC> {
    /// Collect children with `child_of` under the attribute `name`. Rows for
    /// which `child_of` returns `None` (the absent side of an outer join)
    /// contribute no item.
    pub fn with_children<G, C>(self, name: &'static str, child_of: G) -> RowGrouping<R, FK, FP, G>
    where
        G: FnMut(&R) -> Option<C>,
    {
        RowGrouping {
            key_of: self.key_of,
            parent_of: self.parent_of,
            children: Some((name, child_of)),
            _rows: PhantomData,
        }
    }

    /// Lazily group `rows`, which must be ordered by key (see module docs).
    pub fn group<I, K, P, C>(self, rows: I) -> GroupRows<I::IntoIter, FK, FP, FC, K, P, C>
    where
        I: IntoIterator<Item = R>,
        FK: FnMut(&R) -> K,
        FP: FnMut(&R) -> P,
        FC: FnMut(&R) -> Option<C>,
        K: PartialEq,
    {
        GroupRows {
            rows: rows.into_iter(),
            key_of: self.key_of,
            parent_of: self.parent_of,
            children: self.children,
            current: None,
            items: Vec::new(),
        }
    }
}

/// Iterator returned by [`RowGrouping::group`].
pub struct GroupRows<I, FK, FP, FC, K, P, C> {
    rows: I,
    key_of: FK,
    parent_of: FP,
    children: Option<(&'static str, FC)>,
    current: Option<(K, P)>,
    items: Vec<C>,
}

impl<I, FK, FP, FC, K, P, C> GroupRows<I, FK, FP, FC, K, P, C> {
    fn seal(&mut self, parent: P) -> GroupedRecord<P, C> {
        let children = self.children.as_ref().map(|(name, _)| NamedChildren {
            name: *name,
            items: std::mem::take(&mut self.items),
        });
        GroupedRecord { parent, children }
    }
}

impl<I, FK, FP, FC, K, P, C> Iterator for GroupRows<I, FK, FP, FC, K, P, C>
where
    I: Iterator,
    FK: FnMut(&I::Item) -> K,
    FP: FnMut(&I::Item) -> P,
    FC: FnMut(&I::Item) -> Option<C>,
    K: PartialEq,
{
    type Item = GroupedRecord<P, C>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(row) = self.rows.next() {
            let key = (self.key_of)(&row);

            let boundary = matches!(&self.current, Some((current, _)) if *current != key);
            let finished = if boundary {
                self.current.take().map(|(_, parent)| self.seal(parent))
            } else {
                None
            };

            if self.current.is_none() {
                self.current = Some((key, (self.parent_of)(&row)));
            }

            if let Some((_, child_of)) = self.children.as_mut() {
                if let Some(item) = child_of(&row) {
                    self.items.push(item);
                }
            }

            if finished.is_some() {
                return finished;
            }
        }

        self.current.take().map(|(_, parent)| self.seal(parent))
    }
}
