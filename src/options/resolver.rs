//! Turns the option hierarchy of one API or static route into effective policies.

use super::{merge, EffectivePolicy, SubOptions};
use crate::errors::Result;

/// Resolves path/operation overrides against a fixed set of global options
#[derive(Debug, Clone, Copy)]
pub struct PolicyResolver<'a> {
    global: &'a SubOptions,
}

impl<'a> PolicyResolver<'a> {
    pub fn new(global: &'a SubOptions) -> Self {
        Self { global }
    }

    /// Options in force for a whole path, before any operation override
    pub fn path_options(&self, path: &SubOptions) -> SubOptions {
        merge(self.global, path)
    }

    /// Effective policy for one operation, or `None` when it is disabled
    pub fn resolve(&self, path: &SubOptions, operation: &SubOptions) -> Result<Option<EffectivePolicy>> {
        let merged = merge(&self.path_options(path), operation);
        EffectivePolicy::from_options(&merged)
    }
}
