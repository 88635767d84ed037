//! Expense categories
//!
//! The ledger stores categories as free-form tags; these are the tags the
//! client offers.

/// A selectable expense category
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Category {
    /// Tag stored on the expense
    pub id: &'static str,
    /// Display label
    pub label: &'static str,
}

/// All categories, in display order
pub static CATEGORIES: [Category; 6] = [
    Category { id: "food", label: "Food" },
    Category { id: "transport", label: "Transport" },
    Category { id: "accommodation", label: "Accommodation" },
    Category { id: "entertainment", label: "Entertainment" },
    Category { id: "shopping", label: "Shopping" },
    Category { id: "other", label: "Other" },
];

/// Tag used when nothing more specific applies
pub const DEFAULT_CATEGORY: &str = "other";

/// Look up a category by tag
#[must_use]
pub fn find_category(id: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.id == id)
}

/// Display label for a tag; unknown tags display as-is
#[must_use]
pub fn category_label(id: &str) -> &str {
    find_category(id).map_or(id, |c| c.label)
}
