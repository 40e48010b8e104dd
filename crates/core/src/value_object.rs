//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Kit items, delivery lines and stock movement records are value objects:
/// immutable, cloned freely and compared field by field. Two kit items with
/// the same product, quantity and unit are the same item.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
