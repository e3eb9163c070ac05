use serde::{Deserialize, Serialize};

pub type BookId = u32;

/// One book's occurrence count for a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub book_id: BookId,
    pub count: u32,
}

/// Sets the posting for `posting.book_id`, keeping `list` sorted by book id with one entry per book.
/// Returns false when the list already held exactly this posting.
pub fn set_posting(list: &mut Vec<Posting>, posting: Posting) -> bool {
    match list.binary_search_by_key(&posting.book_id, |p| p.book_id) {
        Ok(i) if list[i] == posting => false,
        Ok(i) => {
            list[i] = posting;
            true
        }
        Err(i) => {
            list.insert(i, posting);
            true
        }
    }
}

/// Drops the posting for `book_id`. Returns false when the book was not listed.
pub fn remove_posting(list: &mut Vec<Posting>, book_id: BookId) -> bool {
    match list.binary_search_by_key(&book_id, |p| p.book_id) {
        Ok(i) => {
            list.remove(i);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_posting_replaces_instead_of_appending() {
        let mut list = Vec::new();
        assert!(set_posting(&mut list, Posting { book_id: 7, count: 3 }));
        assert!(set_posting(&mut list, Posting { book_id: 2, count: 1 }));
        assert!(set_posting(&mut list, Posting { book_id: 7, count: 9 }));
        assert!(!set_posting(&mut list, Posting { book_id: 7, count: 9 }));
        assert_eq!(list, vec![Posting { book_id: 2, count: 1 }, Posting { book_id: 7, count: 9 }]);
    }

    #[test]
    fn remove_posting_reports_missing_books() {
        let mut list = vec![Posting { book_id: 1, count: 1 }];
        assert!(!remove_posting(&mut list, 4));
        assert!(remove_posting(&mut list, 1));
        assert!(list.is_empty());
    }
}
