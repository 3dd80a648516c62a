//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects (a quantity, a farm location, a grade) have no identity of their
/// own: two instances with the same attributes are the same value. They are
/// immutable; "changing" one means replacing it with a new value carried by an event.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
