//! Method name to probe constructor lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::OrchestratorError;
use crate::probe::{DnsProbe, HttpProbe, HttpTransport, ProbeKind, ProbeMethod, Resolver, TransportKind};

/// Builds a fresh, uninitialized probe kind.
pub type ProbeConstructor = Box<dyn Fn() -> Box<dyn ProbeKind> + Send + Sync>;

/// Probe constructors keyed by method.
#[derive(Default)]
pub struct ProbeRegistry {
    constructors: HashMap<ProbeMethod, ProbeConstructor>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the DNS, HTTP and HTTPS probes.
    pub fn with_defaults(resolver: Arc<dyn Resolver>, transport: Arc<dyn HttpTransport>) -> Self {
        let mut registry = Self::new();

        registry.register(ProbeMethod::Dns, move || -> Box<dyn ProbeKind> {
            Box::new(DnsProbe::new(resolver.clone()))
        });

        let http_transport = transport.clone();
        registry.register(ProbeMethod::Http, move || -> Box<dyn ProbeKind> {
            Box::new(HttpProbe::new(http_transport.clone(), TransportKind::Http))
        });
        registry.register(ProbeMethod::Https, move || -> Box<dyn ProbeKind> {
            Box::new(HttpProbe::new(transport.clone(), TransportKind::Https))
        });

        registry
    }

    pub fn register<F>(&mut self, method: ProbeMethod, constructor: F)
    where
        F: Fn() -> Box<dyn ProbeKind> + Send + Sync + 'static,
    {
        self.constructors.insert(method, Box::new(constructor));
    }

    /// Map a configured method name to a method with a registered probe.
    pub fn resolve(&self, method: &str) -> Result<ProbeMethod, OrchestratorError> {
        let parsed: ProbeMethod = method
            .parse()
            .map_err(OrchestratorError::UnknownMethod)?;

        if self.constructors.contains_key(&parsed) {
            Ok(parsed)
        } else {
            Err(OrchestratorError::UnknownMethod(method.to_string()))
        }
    }

    pub fn construct(&self, method: ProbeMethod) -> Result<Box<dyn ProbeKind>, OrchestratorError> {
        self.constructors
            .get(&method)
            .map(|constructor| constructor())
            .ok_or_else(|| OrchestratorError::UnknownMethod(method.to_string()))
    }
}
