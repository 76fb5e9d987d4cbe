//! # Model Schemas
//!
//! Declarative model definitions. A schema drives three things: which CRUD
//! operations get bound, how call params are validated per verb, and which
//! fields are hidden from results.

mod field;
mod model;

pub use field::{FieldDef, FieldType};
pub use model::{
    ModelSchema, ParentRef, ShapeMode, ID_FIELD, IDS_PARAM, LIMIT_PARAM, OFFSET_PARAM,
    ROWS_PARAM,
};
