//! Ordered clause lists for SELECT, GROUP BY and ORDER BY.
//!
//! Items keep their registration order unless given an explicit ordinal. When a statement is
//! composed, its lists and those of its joined statements are merged: every item without an
//! ordinal takes its merged position as ordinal, and the result is sorted by
//! `(ordinal, merged position)`. Explicit ordinals therefore place a joined statement's item
//! among the outer statement's items.

use crate::column::Column;

#[derive(Debug, Clone)]
pub(crate) struct ClauseList<T> {
    items: Vec<(Option<usize>, T)>,
}

impl<T> Default for ClauseList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> ClauseList<T> {
    fn push(&mut self, ordinal: Option<usize>, item: T) {
        self.items.push((ordinal, item));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn items(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|(_, item)| item)
    }

    fn last_mut(&mut self) -> Option<&mut T> {
        self.items.last_mut().map(|(_, item)| item)
    }
}

/// Merge lists in the given order and sort them by `(ordinal, merged position)`.
pub(crate) fn merge_ordered<'l, T: 'l>(
    lists: impl IntoIterator<Item = &'l ClauseList<T>>,
) -> Vec<&'l T> {
    let mut merged: Vec<(usize, usize, &T)> = Vec::new();
    for list in lists {
        for (ordinal, item) in &list.items {
            let seq = merged.len();
            merged.push((ordinal.unwrap_or(seq), seq, item));
        }
    }
    merged.sort_by_key(|(ordinal, seq, _)| (*ordinal, *seq));
    merged.into_iter().map(|(_, _, item)| item).collect()
}

/// One projected expression.
#[derive(Debug, Clone)]
pub(crate) struct SelectItem {
    pub(crate) column: Column,
    pub(crate) alias: Option<String>,
}

impl SelectItem {
    pub(crate) fn is_bare(&self) -> bool {
        self.alias.is_none() && self.column.is_bare()
    }
}

/// Collects the SELECT list.
#[derive(Debug, Default)]
pub struct SelectOffer {
    pub(crate) list: ClauseList<SelectItem>,
}

impl SelectOffer {
    pub fn col(&mut self, column: Column) -> &mut Self {
        self.list.push(
            None,
            SelectItem {
                column,
                alias: None,
            },
        );
        self
    }

    /// Project `column` at an explicit ordinal.
    pub fn col_at(&mut self, ordinal: usize, column: Column) -> &mut Self {
        self.list.push(
            Some(ordinal),
            SelectItem {
                column,
                alias: None,
            },
        );
        self
    }

    pub fn cols(&mut self, columns: impl IntoIterator<Item = Column>) -> &mut Self {
        for column in columns {
            self.col(column);
        }
        self
    }

    /// Project `column AS alias`.
    pub fn expr_as(&mut self, column: Column, alias: &str) -> &mut Self {
        self.list.push(
            None,
            SelectItem {
                column,
                alias: Some(alias.to_string()),
            },
        );
        self
    }
}

/// Collects the GROUP BY list.
#[derive(Debug, Default)]
pub struct GroupByOffer {
    pub(crate) list: ClauseList<Column>,
}

impl GroupByOffer {
    pub fn col(&mut self, column: Column) -> &mut Self {
        self.list.push(None, column);
        self
    }

    pub fn col_at(&mut self, ordinal: usize, column: Column) -> &mut Self {
        self.list.push(Some(ordinal), column);
        self
    }

    pub fn cols(&mut self, columns: impl IntoIterator<Item = Column>) -> &mut Self {
        for column in columns {
            self.col(column);
        }
        self
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Placement of NULLs in an ORDER BY entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nulls {
    First,
    Last,
}

/// One ORDER BY entry.
#[derive(Debug, Clone)]
pub(crate) struct OrderItem {
    pub(crate) column: Column,
    pub(crate) direction: Direction,
    pub(crate) nulls: Option<Nulls>,
}

impl OrderItem {
    pub(crate) fn asc(column: Column) -> Self {
        Self {
            column,
            direction: Direction::Asc,
            nulls: None,
        }
    }

    pub(crate) fn suffix(&self) -> &'static str {
        match (self.direction, self.nulls) {
            (Direction::Asc, None) => "",
            (Direction::Desc, None) => " DESC",
            (Direction::Asc, Some(Nulls::First)) => " NULLS FIRST",
            (Direction::Asc, Some(Nulls::Last)) => " NULLS LAST",
            (Direction::Desc, Some(Nulls::First)) => " DESC NULLS FIRST",
            (Direction::Desc, Some(Nulls::Last)) => " DESC NULLS LAST",
        }
    }
}

/// Collects the ORDER BY list.
#[derive(Debug, Default)]
pub struct OrderByOffer {
    pub(crate) list: ClauseList<OrderItem>,
}

impl OrderByOffer {
    fn push(&mut self, ordinal: Option<usize>, column: Column, direction: Direction) -> &mut Self {
        self.list.push(
            ordinal,
            OrderItem {
                column,
                direction,
                nulls: None,
            },
        );
        self
    }

    pub fn asc(&mut self, column: Column) -> &mut Self {
        self.push(None, column, Direction::Asc)
    }

    pub fn desc(&mut self, column: Column) -> &mut Self {
        self.push(None, column, Direction::Desc)
    }

    pub fn asc_at(&mut self, ordinal: usize, column: Column) -> &mut Self {
        self.push(Some(ordinal), column, Direction::Asc)
    }

    pub fn desc_at(&mut self, ordinal: usize, column: Column) -> &mut Self {
        self.push(Some(ordinal), column, Direction::Desc)
    }

    /// Sort NULLs first in the most recent entry.
    pub fn nulls_first(&mut self) -> &mut Self {
        if let Some(item) = self.list.last_mut() {
            item.nulls = Some(Nulls::First);
        }
        self
    }

    /// Sort NULLs last in the most recent entry.
    pub fn nulls_last(&mut self) -> &mut Self {
        if let Some(item) = self.list.last_mut() {
            item.nulls = Some(Nulls::Last);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[(Option<usize>, &'static str)]) -> ClauseList<&'static str> {
        let mut list = ClauseList::default();
        for (ordinal, item) in items {
            list.push(*ordinal, *item);
        }
        list
    }

    #[test]
    fn default_ordinals_follow_merge_order() {
        let outer = list(&[(None, "a"), (None, "b")]);
        let joined = list(&[(None, "c")]);
        assert_eq!(merge_ordered([&outer, &joined]), vec![&"a", &"b", &"c"]);
    }

    #[test]
    fn explicit_ordinals_interleave() {
        let outer = list(&[(None, "a"), (None, "b")]);
        let joined = list(&[(Some(0), "c"), (None, "d")]);
        assert_eq!(merge_ordered([&outer, &joined]), vec![&"a", &"c", &"b", &"d"]);
    }

    #[test]
    fn order_item_suffixes() {
        let mut offer = OrderByOffer::default();
        let c = crate::column::count_all();
        offer.desc(c.clone()).nulls_last().asc(c);
        let items: Vec<_> = offer.list.items().map(OrderItem::suffix).collect();
        assert_eq!(items, vec![" DESC NULLS LAST", ""]);
    }
}
