//! Tests for the bus boundary types.

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Unit;

impl MessageTaxonomy for Unit {
    type Command = ();
    type Event = ();
    type Request = ();
    type Response = ();
}

/// Provider that records how often each endpoint kind was requested
#[derive(Default)]
struct CountingProvider {
    endpoints: AtomicUsize,
    clients: AtomicUsize,
}

impl ServiceEndpointProvider<Unit> for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn create_endpoint(&self) -> Result<ServiceEndpoint<Unit>, ConfigurationError> {
        self.endpoints.fetch_add(1, Ordering::SeqCst);
        Err(ConfigurationError::ProviderConfiguration {
            reason: "endpoint".to_string(),
        })
    }

    fn create_endpoint_client(&self) -> Result<ServiceEndpointClient<Unit>, ConfigurationError> {
        self.clients.fetch_add(1, Ordering::SeqCst);
        Err(ConfigurationError::ProviderConfiguration {
            reason: "client".to_string(),
        })
    }
}

#[test]
fn test_roles_include_expected_sides() {
    assert!(EndpointRole::Client.includes_client());
    assert!(!EndpointRole::Client.includes_server());
    assert!(EndpointRole::Server.includes_server());
    assert!(!EndpointRole::Server.includes_client());
    assert!(EndpointRole::ClientAndServer.includes_client());
    assert!(EndpointRole::ClientAndServer.includes_server());
}

#[test]
fn test_registrations_keep_order_and_role() {
    let mut bus = BusConfiguration::<Unit>::new();
    bus.register(EndpointRole::Server, Arc::new(CountingProvider::default()));
    bus.register(EndpointRole::Client, Arc::new(CountingProvider::default()));

    let roles: Vec<EndpointRole> = bus.registrations().iter().map(|(r, _)| *r).collect();
    assert_eq!(roles, vec![EndpointRole::Server, EndpointRole::Client]);
    assert!(format!("{:?}", bus).contains("counting"));
}

#[test]
fn test_endpoint_creation_is_filtered_by_role() {
    let server = Arc::new(CountingProvider::default());
    let client = Arc::new(CountingProvider::default());

    let mut bus = BusConfiguration::<Unit>::new();
    bus.register(EndpointRole::Server, server.clone());
    bus.register(EndpointRole::Client, client.clone());

    assert!(bus.create_endpoints().is_err());
    assert!(bus.create_endpoint_clients().is_err());

    assert_eq!(server.endpoints.load(Ordering::SeqCst), 1);
    assert_eq!(server.clients.load(Ordering::SeqCst), 0);
    assert_eq!(client.endpoints.load(Ordering::SeqCst), 0);
    assert_eq!(client.clients.load(Ordering::SeqCst), 1);
}

#[test]
fn test_empty_configuration_creates_nothing() {
    let bus = BusConfiguration::<Unit>::default();
    assert!(bus.create_endpoints().unwrap().is_empty());
    assert!(bus.create_endpoint_clients().unwrap().is_empty());
}
