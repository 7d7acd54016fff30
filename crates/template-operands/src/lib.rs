/*
 * 5D Labs Agent Platform - Template Operands
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Template operands core library
//!
//! Reconciles the common-templates and template-validator operands against a
//! resource store: an idempotent create-or-update engine, ordered fail-fast
//! status collection, version migration of stale templates, and a one-time
//! bundle cache.

pub mod bundle;
pub mod config;
pub mod error;
pub mod kinds;
pub mod labels;
pub mod operands;
pub mod reconcile;
pub mod store;
pub mod template;

// Re-export commonly used types
pub use bundle::{BundleCache, BundleError, BundleSource, YamlBundleSource};
pub use config::OperandConfig;
pub use error::{Error, Result};
pub use kinds::{ManagedResource, ResourceRef};
pub use labels::AppLabels;
pub use operands::{CommonTemplates, TemplateValidator};
pub use reconcile::{
    collect_resource_status, delete_all, reconcile_one, DeleteTarget, Outcome, ReconcileOp,
    ReconcileSpec, ResourceStatus, StatusReport,
};
pub use store::{KubeStore, MemoryStore, ResourceStore};
pub use template::Template;
