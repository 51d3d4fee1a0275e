//! # Compositional Data Model
//!
//! Clean DTOs that define tabular input and ternary geometry.
//! These types cross every boundary: caller ↔ filter ↔ trace ↔ bootstrap.
//!
//! Design rule: NO renderer types, NO file-format types here.
//! This module is pure data: no I/O, no state, no async.

pub mod value;
pub mod dataset;
pub mod point;
pub mod axis;

pub use value::Value;
pub use dataset::{Column, ColumnType, Dataset};
pub use point::{Apex, CartesianPoint, TernaryPoint};
pub use axis::{ApexMember, ApexMembers, AxisSpec, TernaryPreset};
