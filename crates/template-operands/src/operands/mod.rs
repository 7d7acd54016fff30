//! Operands: groups of objects reconciled and torn down together.

pub mod common_templates;
pub mod template_validator;

pub use common_templates::CommonTemplates;
pub use template_validator::TemplateValidator;
