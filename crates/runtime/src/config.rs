//! Runtime configuration and the binding specification.

use serde_json::{json, Value as JsonValue};
use std::time::Duration;

/// What a configured global name is bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingTarget {
    /// A key-value namespace.
    Kv(String),
    /// An object-store bucket.
    Object(String),
    /// A SQL database.
    Sql(String),
    /// A durable-object namespace.
    Durable(String),
    /// A message queue.
    Queue(String),
    /// The model runner.
    Model,
}

impl BindingTarget {
    /// Parse a tagged reference of the form `kv:<ns>`, `r2:<bucket>`,
    /// `d1:<db>`, `do:<ns>`, `queue:<q>`, or `ai:`.
    pub fn parse(reference: &str) -> Option<Self> {
        let (tag, rest) = reference.split_once(':')?;
        match tag {
            "kv" if !rest.is_empty() => Some(Self::Kv(rest.to_owned())),
            "r2" if !rest.is_empty() => Some(Self::Object(rest.to_owned())),
            "d1" if !rest.is_empty() => Some(Self::Sql(rest.to_owned())),
            "do" if !rest.is_empty() => Some(Self::Durable(rest.to_owned())),
            "queue" if !rest.is_empty() => Some(Self::Queue(rest.to_owned())),
            "ai" if rest.is_empty() => Some(Self::Model),
            _ => None,
        }
    }
}

/// An ordered mapping from script global name to binding target.
///
/// Immutable per invocation; consumed once at runtime construction to
/// install globals.
#[derive(Clone, Debug, Default)]
pub struct BindingSpec {
    entries: Vec<(String, BindingTarget)>,
}

impl BindingSpec {
    /// Create an empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one binding.
    #[must_use]
    pub fn with(mut self, name: &str, target: BindingTarget) -> Self {
        self.entries.push((name.to_owned(), target));
        self
    }

    /// Parse `(name, tagged-reference)` pairs, preserving order.
    pub fn parse<'a, I>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut spec = Self::new();
        for (name, reference) in pairs {
            let target = BindingTarget::parse(reference)
                .ok_or_else(|| format!("unrecognized binding reference: {reference}"))?;
            spec.entries.push((name.to_owned(), target));
        }
        Ok(spec)
    }

    /// The configured entries, in declaration order.
    pub fn entries(&self) -> &[(String, BindingTarget)] {
        &self.entries
    }
}

/// Tunables for a runtime instance.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Wall-clock budget per invocation.
    pub deadline: Duration,
    /// Whether scripts may reach the network through global `fetch`.
    pub allow_outbound: bool,
    /// Platform metadata attached to inbound requests as `request.cf`.
    pub cf_metadata: JsonValue,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            allow_outbound: true,
            cf_metadata: default_cf_metadata(),
        }
    }
}

/// The `cf` object presented to scripts on emulated requests.
fn default_cf_metadata() -> JsonValue {
    json!({
        "colo": "DFW",
        "country": "US",
        "asn": 395747,
        "asOrganization": "Outpost Emulator",
        "city": "Dallas",
        "continent": "NA",
        "latitude": "32.77670",
        "longitude": "-96.79700",
        "postalCode": "75201",
        "region": "Texas",
        "timezone": "America/Chicago"
    })
}
