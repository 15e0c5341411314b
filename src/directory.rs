//! Collaborators the engine calls out to.
//!
//! The engine does not own developer or app records. It asks a
//! [`DeveloperDirectory`] and an [`AppDirectory`] whether the claimant is
//! known, and after a successful proof tells them the domain is verified
//! and asks an [`AdminNotifier`] to queue a human review.

use crate::config::DirectoryConfig;
use crate::error::Result;
use crate::proof::VerificationType;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Developer accounts.
#[async_trait]
pub trait DeveloperDirectory: Send + Sync {
    /// Returns true if the developer exists.
    async fn exists(&self, developer_id: &str) -> Result<bool>;

    /// Record that the developer proved domain ownership via `method`.
    async fn mark_domain_verified(
        &self,
        developer_id: &str,
        method: VerificationType,
    ) -> Result<()>;
}

/// Apps owned by developers.
#[async_trait]
pub trait AppDirectory: Send + Sync {
    /// Returns true if the app exists and belongs to `developer_id`.
    async fn exists(&self, app_id: &str, developer_id: &str) -> Result<bool>;

    /// Record that the app's domain is verified.
    async fn mark_domain_verified(&self, _app_id: &str, _domain: &str) -> Result<()> {
        Ok(())
    }
}

/// Queues verified claims for human review.
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    /// Notify admins that `developer_id` is ready for review.
    async fn notify_ready_for_review(&self, developer_id: &str) -> Result<()>;
}

/// Developer and app directory held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    apps_by_developer: RwLock<HashMap<String, HashSet<String>>>,
    verified_developers: RwLock<HashMap<String, VerificationType>>,
    verified_apps: RwLock<HashMap<String, String>>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the directory from configuration.
    #[must_use]
    pub fn from_config(config: &DirectoryConfig) -> Self {
        let directory = Self::new();
        for developer in &config.developers {
            directory.add_developer(&developer.id);
            for app in &developer.apps {
                directory.add_app(&developer.id, app);
            }
        }
        directory
    }

    /// Register a developer.
    pub fn add_developer(&self, developer_id: &str) {
        self.apps_by_developer
            .write()
            .entry(developer_id.to_string())
            .or_default();
    }

    /// Register an app owned by `developer_id`, registering the developer too.
    pub fn add_app(&self, developer_id: &str, app_id: &str) {
        self.apps_by_developer
            .write()
            .entry(developer_id.to_string())
            .or_default()
            .insert(app_id.to_string());
    }

    /// Method the developer was verified with, if any.
    #[must_use]
    pub fn developer_verification(&self, developer_id: &str) -> Option<VerificationType> {
        self.verified_developers.read().get(developer_id).copied()
    }

    /// Verified domain recorded for the app, if any.
    #[must_use]
    pub fn app_verified_domain(&self, app_id: &str) -> Option<String> {
        self.verified_apps.read().get(app_id).cloned()
    }
}

#[async_trait]
impl DeveloperDirectory for InMemoryDirectory {
    async fn exists(&self, developer_id: &str) -> Result<bool> {
        Ok(self.apps_by_developer.read().contains_key(developer_id))
    }

    async fn mark_domain_verified(
        &self,
        developer_id: &str,
        method: VerificationType,
    ) -> Result<()> {
        self.verified_developers
            .write()
            .insert(developer_id.to_string(), method);
        Ok(())
    }
}

#[async_trait]
impl AppDirectory for InMemoryDirectory {
    async fn exists(&self, app_id: &str, developer_id: &str) -> Result<bool> {
        Ok(self
            .apps_by_developer
            .read()
            .get(developer_id)
            .is_some_and(|apps| apps.contains(app_id)))
    }

    async fn mark_domain_verified(&self, app_id: &str, domain: &str) -> Result<()> {
        self.verified_apps
            .write()
            .insert(app_id.to_string(), domain.to_string());
        Ok(())
    }
}

/// [`AdminNotifier`] that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl AdminNotifier for TracingNotifier {
    async fn notify_ready_for_review(&self, developer_id: &str) -> Result<()> {
        info!(developer_id, "Developer domain verified, ready for admin review");
        Ok(())
    }
}
