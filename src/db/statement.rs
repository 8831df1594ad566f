//! Prepared statements with typed parameter binding.

use crate::backend::PreparedQuery;
use crate::db::result::ResultSet;
use crate::error::{BindingError, DbResult};
use crate::models::{BoundValue, DeviceId, ParamType, Value};
use tracing::debug;

/// A compiled query bound to the connection that compiled it.
///
/// Bindings persist across executions until replaced by the next `bind_param`.
pub struct Statement<'c> {
    prepared: Box<dyn PreparedQuery + 'c>,
    device: DeviceId,
    query: String,
    bound: Vec<BoundValue>,
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("query", &self.query)
            .field("param_count", &self.prepared.param_count())
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

impl<'c> Statement<'c> {
    pub(crate) fn new(
        prepared: Box<dyn PreparedQuery + 'c>,
        device: DeviceId,
        query: impl Into<String>,
    ) -> Self {
        Self {
            prepared,
            device,
            query: query.into(),
            bound: Vec::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Number of placeholders declared by the compiled query.
    pub fn param_count(&self) -> usize {
        self.prepared.param_count()
    }

    /// Values bound by the last successful `bind_param`.
    pub fn bound_values(&self) -> &[BoundValue] {
        &self.bound
    }

    /// Bind `values` typed by the tag string `types` (`i`, `d`, `s`, `b` per value).
    ///
    /// Nothing is bound unless every check passes: tags are known, there is one
    /// tag per value, the count matches the statement, and every value coerces to
    /// its tag.
    pub fn bind_param(&mut self, types: &str, values: &[Value]) -> DbResult<()> {
        let tags = ParamType::parse_tags(types)?;
        if tags.len() != values.len() {
            return Err(BindingError::CountMismatch {
                types: tags.len(),
                values: values.len(),
            }
            .into());
        }
        let required = self.param_count();
        if tags.len() != required {
            return Err(BindingError::ArityMismatch {
                given: tags.len(),
                required,
            }
            .into());
        }

        self.bound = tags
            .iter()
            .zip(values)
            .enumerate()
            .map(|(index, (ty, value))| BoundValue::coerce(index, *ty, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }

    /// Run the statement with its current bindings.
    pub async fn execute(&mut self) -> DbResult<ResultSet<'_>> {
        let required = self.param_count();
        if self.bound.len() != required {
            return Err(BindingError::ArityMismatch {
                given: self.bound.len(),
                required,
            }
            .into());
        }

        debug!(device = %self.device, params = self.bound.len(), "Executing statement");
        let cursor = self.prepared.execute(&self.bound).await?;
        Ok(ResultSet::new(cursor, self.device.clone(), None))
    }
}
