// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Velero backend, driven through `velero.io/v1` custom resources.

use super::{BackupError, BackupSystem};
use async_trait::async_trait;
use keel_core::{
    App, AppId, Backup, BackupPhase, Restore, RestorePhase, APP_ID_ANNOTATION,
    APP_SEQUENCE_ANNOTATION,
};
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, PostParams,
};
use kube::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Label marking backups taken by the control plane
pub const BACKUP_LABEL: &str = "keel.io/backup";

const DEFAULT_TTL: &str = "720h";

fn backup_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("velero.io", "v1", "Backup"))
}

fn restore_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("velero.io", "v1", "Restore"))
}

/// Backup system backed by Velero.
#[derive(Clone)]
pub struct VeleroBackups {
    client: Client,
    /// Namespace Velero's objects live in
    namespace: String,
    /// Namespace application resources are deployed to
    app_namespace: String,
}

impl VeleroBackups {
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        app_namespace: impl Into<String>,
    ) -> Self {
        Self { client, namespace: namespace.into(), app_namespace: app_namespace.into() }
    }

    fn backups(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &backup_resource())
    }

    fn restores(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &restore_resource())
    }
}

#[async_trait]
impl BackupSystem for VeleroBackups {
    async fn create_backup(&self, app: &App, sequence: i64) -> Result<Backup, BackupError> {
        let object = backup_object(app, &self.app_namespace, sequence);
        let created = self.backups().create(&PostParams::default(), &object).await?;
        let backup = backup_from_object(&created)?;
        tracing::info!(app_id = %app.id, backup = %backup.name, "created backup");
        Ok(backup)
    }

    async fn has_unfinished_backup(&self, app_id: &AppId) -> Result<bool, BackupError> {
        let list = self.backups().list(&ListParams::default().labels(BACKUP_LABEL)).await?;
        for object in &list.items {
            let backup = backup_from_object(object)?;
            if backup.app_id().as_ref() == Some(app_id) && backup.phase.is_unfinished() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn get_backup(&self, name: &str) -> Result<Option<Backup>, BackupError> {
        match self.backups().get_opt(name).await? {
            Some(object) => Ok(Some(backup_from_object(&object)?)),
            None => Ok(None),
        }
    }

    async fn get_restore(&self, name: &str) -> Result<Option<Restore>, BackupError> {
        match self.restores().get_opt(name).await? {
            Some(object) => Ok(Some(restore_from_object(&object)?)),
            None => Ok(None),
        }
    }

    async fn create_restore(&self, backup_name: &str) -> Result<(), BackupError> {
        match self.restores().create(&PostParams::default(), &restore_object(backup_name)).await {
            Ok(_) => {
                tracing::info!(backup = backup_name, "created restore");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_restore(&self, name: &str) -> Result<(), BackupError> {
        match self.restores().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Backup request for the app's namespace, tagged with the deployed sequence.
pub(crate) fn backup_object(app: &App, app_namespace: &str, sequence: i64) -> DynamicObject {
    let ttl = app.snapshot_ttl.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let mut object = DynamicObject::new("", &backup_resource()).data(json!({
        "spec": {
            "includedNamespaces": [app_namespace],
            "ttl": ttl.unwrap_or(DEFAULT_TTL),
            "snapshotVolumes": true,
        }
    }));
    object.metadata.name = None;
    object.metadata.generate_name = Some(format!("{}-", app.slug));
    object.metadata.labels = Some(BTreeMap::from([(BACKUP_LABEL.to_string(), "true".to_string())]));
    object.metadata.annotations = Some(BTreeMap::from([
        (APP_ID_ANNOTATION.to_string(), app.id.to_string()),
        (APP_SEQUENCE_ANNOTATION.to_string(), sequence.to_string()),
    ]));
    object
}

/// Restore request named after the backup it restores.
pub(crate) fn restore_object(backup_name: &str) -> DynamicObject {
    DynamicObject::new(backup_name, &restore_resource()).data(json!({
        "spec": {
            "backupName": backup_name,
            "restorePVs": true,
        }
    }))
}

fn phase(object: &DynamicObject) -> &str {
    object.data.pointer("/status/phase").and_then(Value::as_str).unwrap_or_default()
}

pub(crate) fn backup_from_object(object: &DynamicObject) -> Result<Backup, BackupError> {
    let name = object.metadata.name.clone().ok_or(BackupError::Unnamed { kind: "Backup" })?;
    let included_namespaces = object
        .data
        .pointer("/spec/includedNamespaces")
        .and_then(Value::as_array)
        .map(|ns| ns.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    Ok(Backup {
        name,
        phase: BackupPhase::parse(phase(object)),
        included_namespaces,
        annotations: object.metadata.annotations.clone().unwrap_or_default(),
    })
}

pub(crate) fn restore_from_object(object: &DynamicObject) -> Result<Restore, BackupError> {
    let name = object.metadata.name.clone().ok_or(BackupError::Unnamed { kind: "Restore" })?;
    let backup_name = object
        .data
        .pointer("/spec/backupName")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| name.clone());
    Ok(Restore { name, backup_name, phase: RestorePhase::parse(phase(object)) })
}
