//! Comparison and mutation operators usable as where-clause or SET values.
//!
//! Each helper yields a [`Raw`] rendered as `<operator> <escaped operand>`.

use crate::writer::value::{Raw, SqlValue};

macro_rules! operators {
    ($($(#[$meta:meta])* $name:ident => $op:literal;)*) => {
        $(
            $(#[$meta])*
            pub fn $name(value: impl Into<SqlValue>) -> Raw {
                Raw::operator($op, value)
            }
        )*
    };
}

operators! {
    /// `= value`
    eq => "=";
    /// `!= value`
    neq => "!=";
    /// Exact equality, `== value`.
    eeq => "==";
    /// Any value in a set equals, `?= value`.
    any => "?=";
    /// All values in a set equal, `*= value`.
    all => "*=";
    /// Fuzzy match, `~ value`.
    feq => "~";
    nfeq => "!~";
    fany => "?~";
    fall => "*~";
    lt => "<";
    lte => "<=";
    gt => ">";
    gte => ">=";
    contains => "CONTAINS";
    contains_not => "CONTAINSNOT";
    contains_all => "CONTAINSALL";
    contains_any => "CONTAINSANY";
    contains_none => "CONTAINSNONE";
    inside => "INSIDE";
    not_inside => "NOTINSIDE";
    all_inside => "ALLINSIDE";
    any_inside => "ANYINSIDE";
    none_inside => "NONEINSIDE";
    outside => "OUTSIDE";
    intersects => "INTERSECTS";
    /// Append to an array field in a SET clause, `+= value`.
    add => "+=";
    /// Remove from an array field in a SET clause, `-= value`.
    remove => "-=";
}
