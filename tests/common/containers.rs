// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for MongoDB.
//!
//! Provides helpers to spin up MongoDB containers for integration tests.

use doc_replicator::resilience::RetryConfig;
use doc_replicator::{MongoReplica, MongoSource};
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

/// Create a standalone MongoDB container.
///
/// Uses the official mongo:7 image. Waits for "Waiting for connections".
pub fn mongo_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("mongo", "7")
        .with_exposed_port(27017)
        .with_wait_for(WaitFor::message_on_stdout("Waiting for connections"));
    docker.run(image)
}

/// Get the connection string for a container.
pub fn mongo_uri(container: &Container<'_, GenericImage>) -> String {
    let port = container.get_host_port_ipv4(27017);
    format!("mongodb://127.0.0.1:{}/?directConnection=true", port)
}

/// A MongoDB server used as either end of a sync.
pub struct TestMongo<'a> {
    #[allow(dead_code)] // Kept alive for container lifetime
    container: Container<'a, GenericImage>,
    pub uri: String,
}

impl<'a> TestMongo<'a> {
    pub fn new(docker: &'a Cli) -> Self {
        let container = mongo_container(docker);
        let uri = mongo_uri(&container);
        Self { container, uri }
    }

    /// A raw driver client, for seeding and assertions.
    pub async fn client(&self) -> mongodb::Client {
        mongodb::Client::with_uri_str(&self.uri)
            .await
            .expect("Failed to create MongoDB client")
    }

    pub async fn source(&self, database: &str) -> MongoSource {
        MongoSource::connect(&self.uri, database, &RetryConfig::testing())
            .await
            .expect("Failed to connect source")
    }

    pub async fn replica(&self, database: &str, label: &str) -> MongoReplica {
        MongoReplica::connect(&self.uri, database, Some(label), &RetryConfig::testing())
            .await
            .expect("Failed to connect replica")
    }
}
