//! Scratch schema lifecycle.

use crate::error::{Result, SampleError};
use crate::source::ScratchStore;
use tracing::{info, warn};

/// Owns the scratch schema for one run.
///
/// Lifecycle: create, populate, index, resolve, read, then drop. The schema
/// is dropped on `finish` and on every early exit (through `Drop`) unless
/// `keep` is set.
pub struct StagingSession<'s, S: ScratchStore> {
    store: &'s mut S,
    schema: String,
    keep: bool,
    active: bool,
}

impl<'s, S: ScratchStore> StagingSession<'s, S> {
    /// Create the scratch schema. An existing schema of the same name is
    /// dropped first when `force` is set; otherwise it is a resource error.
    pub fn open(store: &'s mut S, schema: &str, force: bool, keep: bool) -> Result<Self> {
        if store.schema_exists(schema)? {
            if !force {
                return Err(SampleError::resource(
                    schema,
                    "scratch schema already exists; use --force to drop it",
                ));
            }
            info!("Dropping existing scratch schema {}", schema);
            store.drop_schema(schema)?;
        }

        store.create_schema(schema)?;
        info!("Created scratch schema {}", schema);

        Ok(Self {
            store,
            schema: schema.to_string(),
            keep,
            active: true,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn store(&mut self) -> &mut S {
        self.store
    }

    /// Hand the store back, dropping the schema unless `keep` is set
    pub fn finish(mut self) -> Result<()> {
        self.active = false;
        if self.keep {
            info!("Keeping scratch schema {}", self.schema);
            return Ok(());
        }
        self.store.drop_schema(&self.schema)?;
        info!("Dropped scratch schema {}", self.schema);
        Ok(())
    }
}

impl<S: ScratchStore> Drop for StagingSession<'_, S> {
    fn drop(&mut self) {
        if !self.active || self.keep {
            return;
        }
        if let Err(e) = self.store.drop_schema(&self.schema) {
            // the enclosing transaction rollback removes it anyway
            warn!("Could not drop scratch schema {}: {}", self.schema, e);
        }
    }
}
