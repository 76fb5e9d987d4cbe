//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use opkernel::core::{named_hook, CoreError, HookScope, Phase};
use opkernel::schema::{FieldDef, FieldType, ModelSchema};
use opkernel::storage::InMemoryDatabase;
use opkernel::{Api, ApiBuilder};

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn logged(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn clear(log: &Log) {
    log.lock().unwrap().clear();
}

pub fn tenant_schema() -> ModelSchema {
    ModelSchema::new("Tenant").field(FieldDef::new("name", FieldType::String))
}

/// `Item` with a unique required name, nested under `/tenants/:tenant_id`
pub fn item_schema() -> ModelSchema {
    ModelSchema::new("Item")
        .field(FieldDef::new("name", FieldType::String).required().unique())
        .field(FieldDef::new("qty", FieldType::Integer))
        .parent("tenants", "tenant_id")
}

/// Builder with `Tenant` and `Item` bound
pub fn builder(database: &InMemoryDatabase) -> ApiBuilder {
    let mut builder = ApiBuilder::new(database.clone());
    builder.bind(tenant_schema()).unwrap();
    builder.bind(item_schema()).unwrap();
    builder
}

/// Record `tag` whenever a hook at `phase` and `scope` runs
pub fn record(builder: &mut ApiBuilder, phase: Phase, scope: HookScope, tag: &str, log: &Log) {
    let log = Arc::clone(log);
    let tag = tag.to_string();
    builder.hook(
        phase,
        scope,
        named_hook(tag.clone(), move |_ctx| {
            log.lock().unwrap().push(tag.clone());
            Ok(())
        }),
    );
}

/// Record every phase name under the global scope
pub fn record_phases(builder: &mut ApiBuilder, log: &Log) {
    for phase in Phase::LIFECYCLE {
        record(builder, phase, HookScope::global(), phase.as_str(), log);
    }
}

/// Fail every call at `phase`
pub fn fail_at(builder: &mut ApiBuilder, phase: Phase, err: CoreError) {
    builder.hook(
        phase,
        HookScope::global(),
        named_hook("fail", move |_ctx| Err(err.clone())),
    );
}

pub fn main_sequence() -> Vec<String> {
    Phase::MAIN_SEQUENCE
        .iter()
        .map(|p| p.as_str().to_string())
        .collect()
}

/// Api recording every phase of every call
pub fn recorded_api() -> (Api, InMemoryDatabase, Log) {
    let database = InMemoryDatabase::new();
    let log = new_log();
    let mut builder = builder(&database);
    record_phases(&mut builder, &log);
    (builder.build(), database, log)
}
