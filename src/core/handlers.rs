//! Generic CRUD Handlers
//!
//! One handler per CRUD target, each running against the call's session.
//! Params arrive already validated for the target's shape mode.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use uuid::Uuid;

use super::context::{Context, Surface};
use super::error::{CoreError, CoreResult};
use super::operation::{OperationHandler, Target};
use crate::schema::{ModelSchema, IDS_PARAM, ID_FIELD, LIMIT_PARAM, OFFSET_PARAM, ROWS_PARAM};
use crate::storage::Record;

/// Handler for a generic CRUD target
pub struct CrudHandler {
    target: Target,
    schema: Arc<ModelSchema>,
}

impl CrudHandler {
    pub fn new(target: Target, schema: Arc<ModelSchema>) -> Self {
        Self { target, schema }
    }

    async fn dispatch(&self, ctx: &mut Context) -> CoreResult<Value> {
        match self.target {
            Target::Create => {
                let params = ctx.params.clone();
                create_row(ctx, params).await.map(Value::Object)
            }
            Target::Read => self.fetch_scoped(ctx).await.map(|(_, row)| Value::Object(row)),
            Target::Update => self.update(ctx, false).await,
            Target::Replace => self.update(ctx, true).await,
            Target::Delete => {
                let (id, row) = self.fetch_scoped(ctx).await?;
                let model = ctx.model.clone();
                ctx.db.delete(&model, &id).await?;
                Ok(Value::Object(row))
            }
            Target::List => self.list(ctx).await,
            Target::Clear => {
                let rows = ctx.db.list(&ctx.model, &filters(&ctx.params)).await?;
                let model = ctx.model.clone();
                let mut deleted = 0usize;
                for row in rows {
                    if let Some(id) = row.get(ID_FIELD).and_then(Value::as_str) {
                        if ctx.db.delete(&model, id).await? {
                            deleted += 1;
                        }
                    }
                }
                Ok(json!({ "deleted": deleted }))
            }
            Target::BulkCreate => {
                let rows = match ctx.params.get(ROWS_PARAM) {
                    Some(Value::Array(rows)) => rows.clone(),
                    _ => return Err(CoreError::bad_request("rows must be an array")),
                };
                let mut created = Vec::with_capacity(rows.len());
                for row in rows {
                    let Value::Object(row) = row else {
                        return Err(CoreError::bad_request("rows must contain objects"));
                    };
                    created.push(Value::Object(create_row(ctx, row).await?));
                }
                Ok(Value::Array(created))
            }
            Target::BulkDelete => self.bulk_delete(ctx).await,
            Target::Custom => Err(CoreError::internal(format!(
                "{}.{} has no generic handler",
                ctx.model, ctx.verb
            ))),
        }
    }

    /// Load the addressed row, hiding rows outside the caller's parent
    async fn fetch_scoped(&self, ctx: &Context) -> CoreResult<(String, Record)> {
        let id = ctx
            .param_str(ID_FIELD)
            .ok_or_else(|| CoreError::bad_request("missing id"))?
            .to_string();

        let row = ctx
            .db
            .get(&ctx.model, &id)
            .await?
            .filter(|row| self.in_parent_scope(ctx, row))
            .ok_or_else(|| CoreError::not_found(format!("{} {}", ctx.model, id)))?;
        Ok((id, row))
    }

    /// A parent key in params scopes the call, except in the body of a
    /// direct update or replace, where it is the new value.
    fn in_parent_scope(&self, ctx: &Context, row: &Record) -> bool {
        let Some(key) = self.schema.parent_key() else {
            return true;
        };
        let moves_row = matches!(self.target, Target::Update | Target::Replace)
            && ctx.surface() != Surface::Nested;
        match ctx.params.get(key) {
            Some(expected) if !moves_row => row.get(key) == Some(expected),
            _ => true,
        }
    }

    async fn update(&self, ctx: &mut Context, replace: bool) -> CoreResult<Value> {
        let (id, existing) = self.fetch_scoped(ctx).await?;

        let mut row = if replace { Record::new() } else { existing };
        for (key, value) in &ctx.params {
            if key != ID_FIELD {
                row.insert(key.clone(), value.clone());
            }
        }
        row.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let model = ctx.model.clone();
        ctx.db.add(&model, &id, row.clone()).await?;
        Ok(Value::Object(row))
    }

    async fn list(&self, ctx: &Context) -> CoreResult<Value> {
        let offset = ctx
            .param(OFFSET_PARAM)
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let limit = ctx
            .param(LIMIT_PARAM)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(usize::MAX);

        let rows = ctx.db.list(&ctx.model, &filters(&ctx.params)).await?;
        Ok(Value::Array(
            rows.into_iter()
                .skip(offset)
                .take(limit)
                .map(Value::Object)
                .collect(),
        ))
    }

    async fn bulk_delete(&self, ctx: &mut Context) -> CoreResult<Value> {
        let ids: Vec<String> = match ctx.params.get(IDS_PARAM) {
            Some(Value::Array(ids)) => ids
                .iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect(),
            _ => return Err(CoreError::bad_request("ids must be an array")),
        };

        let model = ctx.model.clone();
        let mut deleted = 0usize;
        for id in ids {
            let in_scope = match ctx.db.get(&model, &id).await? {
                Some(row) => self.in_parent_scope(ctx, &row),
                None => false,
            };
            if in_scope && ctx.db.delete(&model, &id).await? {
                deleted += 1;
            }
        }
        Ok(json!({ "deleted": deleted }))
    }
}

impl OperationHandler for CrudHandler {
    fn handle<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, CoreResult<Value>> {
        Box::pin(self.dispatch(ctx))
    }
}

async fn create_row(ctx: &mut Context, mut row: Record) -> CoreResult<Record> {
    let id = Uuid::new_v4().to_string();
    row.insert(ID_FIELD.to_string(), Value::String(id.clone()));

    let model = ctx.model.clone();
    ctx.db.add(&model, &id, row.clone()).await?;
    Ok(row)
}

/// Equality filters: every param except pagination
fn filters(params: &Record) -> Record {
    params
        .iter()
        .filter(|(k, _)| k.as_str() != LIMIT_PARAM && k.as_str() != OFFSET_PARAM)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
