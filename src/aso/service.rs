use std::sync::Arc;

use futures::future::join_all;
use kube::api::DynamicObject;

use super::Reconciler;
use super::ResourceSpecGetter;
use crate::error::Result;

/// An Azure service made of ASO resources, driven through a [Reconciler].
pub struct Service<R> {
    name: String,
    reconciler: R,
    specs: Vec<Arc<dyn ResourceSpecGetter>>,
}

impl<R> Service<R>
where
    R: Reconciler,
{
    pub fn new(name: impl Into<String>, reconciler: R, specs: Vec<Arc<dyn ResourceSpecGetter>>) -> Self {
        Service {
            name: name.into(),
            reconciler,
            specs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates or updates every resource in order, stopping at the first failure.
    pub async fn reconcile(&self) -> Result<Vec<DynamicObject>> {
        let mut applied = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let object = self
                .reconciler
                .create_or_update_resource(Arc::clone(spec), &self.name)
                .await
                .inspect_err(|err| log::error!(service = self.name.as_str(), error:% = err; "failed to reconcile ASO resource"))?;
            applied.push(object);
        }
        Ok(applied)
    }

    /// Deletes every resource. All deletes are attempted; the first failure is returned.
    pub async fn delete(&self) -> Result<()> {
        let results = join_all(
            self.specs
                .iter()
                .map(|spec| self.reconciler.delete_resource(Arc::clone(spec), &self.name)),
        )
        .await;

        let mut first_error = None;
        for err in results.into_iter().filter_map(|result| result.err()) {
            log::error!(service = self.name.as_str(), error:% = err; "failed to delete ASO resource");
            first_error.get_or_insert(err);
        }
        first_error.map_or(Ok(()), Err)
    }
}
