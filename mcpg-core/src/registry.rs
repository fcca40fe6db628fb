//! Capability aggregation.
//!
//! Each Ready backend contributes one [`Registry`] keyed by bare capability
//! name. The unified view is a merged [`Registry`] whose keys are
//! `<backend>___<name>`. Both are published as immutable snapshots through
//! [`CapabilityRegistry`]; readers never take a lock.
//!
//! Descriptors are kept as opaque JSON objects. Schemas are never
//! validated: a descriptor is skipped only when it has no usable name.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{GatewayError, GatewayResult};

/// Separator between backend name and capability name in unified keys.
/// Backend names may neither contain it nor end in `_`, so the first
/// occurrence always splits a key correctly.
pub const NAMESPACE_SEPARATOR: &str = "___";

/// Whether `name` can prefix unified keys without two backends ever
/// producing the same key.
pub fn is_namespace_safe(name: &str) -> bool {
    !name.contains(NAMESPACE_SEPARATOR) && !name.ends_with('_')
}

/// Build a unified key.
pub fn namespaced(backend: &str, name: &str) -> String {
    format!("{backend}{NAMESPACE_SEPARATOR}{name}")
}

/// Split a unified key into `(backend, name)` on the first separator.
pub fn split_namespaced(key: &str) -> Option<(&str, &str)> {
    let (backend, name) = key.split_once(NAMESPACE_SEPARATOR)?;
    if backend.is_empty() || name.is_empty() {
        return None;
    }
    Some((backend, name))
}

/// The three capability families an MCP server can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 3] = [Self::Tool, Self::Resource, Self::Prompt];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Resource => "resource",
            Self::Prompt => "prompt",
        }
    }

    /// Method used to discover this family.
    pub fn list_method(self) -> &'static str {
        match self {
            Self::Tool => "tools/list",
            Self::Resource => "resources/list",
            Self::Prompt => "prompts/list",
        }
    }

    /// Field holding the array in a list result.
    pub fn result_key(self) -> &'static str {
        match self {
            Self::Tool => "tools",
            Self::Resource => "resources",
            Self::Prompt => "prompts",
        }
    }

    /// Field that identifies one descriptor.
    pub fn id_field(self) -> &'static str {
        match self {
            Self::Tool | Self::Prompt => "name",
            Self::Resource => "uri",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw descriptor arrays collected from one backend.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub tools: Vec<Value>,
    pub resources: Vec<Value>,
    pub prompts: Vec<Value>,
}

impl Discovery {
    pub fn list_mut(&mut self, kind: CapabilityKind) -> &mut Vec<Value> {
        match kind {
            CapabilityKind::Tool => &mut self.tools,
            CapabilityKind::Resource => &mut self.resources,
            CapabilityKind::Prompt => &mut self.prompts,
        }
    }
}

/// One registered capability.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    /// Owning backend.
    pub backend: String,
    /// Name (or URI) as the backend knows it.
    pub name: String,
    /// The descriptor exactly as the backend sent it.
    pub descriptor: Map<String, Value>,
}

/// Insertion-ordered map from key to capability.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<Capability>,
    index: HashMap<String, usize>,
    keys: Vec<String>,
}

impl Catalog {
    /// Insert under `key`. Returns false, leaving the catalog unchanged,
    /// if the key is already taken.
    fn insert(&mut self, key: String, capability: Capability) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.keys.push(key);
        self.entries.push(capability);
        true
    }

    pub fn get(&self, key: &str) -> Option<&Capability> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(key, capability)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Capability)> {
        self.keys.iter().map(String::as_str).zip(self.entries.iter())
    }
}

/// How a listing is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingView {
    /// Bare names, one backend.
    Routed,
    /// Namespaced names, descriptions tagged with the owning backend.
    Unified,
}

/// A snapshot of tools, resources and prompts.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tools: Catalog,
    resources: Catalog,
    prompts: Catalog,
}

impl Registry {
    /// Build one backend's registry from its discovery results. Entries
    /// without a usable name, and duplicates, are skipped with a warning.
    pub fn from_discovery(backend: &str, discovery: &Discovery) -> Self {
        let mut registry = Self::default();
        for kind in CapabilityKind::ALL {
            let raw = match kind {
                CapabilityKind::Tool => &discovery.tools,
                CapabilityKind::Resource => &discovery.resources,
                CapabilityKind::Prompt => &discovery.prompts,
            };
            let catalog = registry.catalog_mut(kind);
            for (position, entry) in raw.iter().enumerate() {
                let Some(capability) = parse_descriptor(backend, kind, entry) else {
                    warn!(
                        backend,
                        kind = kind.as_str(),
                        position,
                        entry = %truncate_for_log(entry),
                        "skipping {kind} without a usable {}",
                        kind.id_field()
                    );
                    continue;
                };
                let key = capability.name.clone();
                if !catalog.insert(key.clone(), capability) {
                    warn!(backend, kind = kind.as_str(), name = %key, "skipping duplicate {kind}");
                }
            }
        }
        registry
    }

    /// Merge per-backend registries into the unified view.
    pub fn merge<'a>(registries: impl IntoIterator<Item = &'a Registry>) -> Self {
        let mut merged = Self::default();
        for registry in registries {
            for kind in CapabilityKind::ALL {
                for (_, capability) in registry.catalog(kind).iter() {
                    let key = namespaced(&capability.backend, &capability.name);
                    if !merged.catalog_mut(kind).insert(key.clone(), capability.clone()) {
                        warn!(backend = %capability.backend, key = %key, "duplicate unified key");
                    }
                }
            }
        }
        merged
    }

    pub fn catalog(&self, kind: CapabilityKind) -> &Catalog {
        match kind {
            CapabilityKind::Tool => &self.tools,
            CapabilityKind::Resource => &self.resources,
            CapabilityKind::Prompt => &self.prompts,
        }
    }

    fn catalog_mut(&mut self, kind: CapabilityKind) -> &mut Catalog {
        match kind {
            CapabilityKind::Tool => &mut self.tools,
            CapabilityKind::Resource => &mut self.resources,
            CapabilityKind::Prompt => &mut self.prompts,
        }
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Look up a capability by key.
    ///
    /// # Errors
    ///
    /// `UnknownCapability` if nothing is registered under `key`.
    pub fn resolve(&self, kind: CapabilityKind, key: &str) -> GatewayResult<&Capability> {
        self.catalog(kind)
            .get(key)
            .ok_or_else(|| GatewayError::UnknownCapability {
                kind: kind.as_str(),
                name: key.to_string(),
            })
    }

    /// Render a `*/list` result, e.g. `{"tools": [...]}`.
    pub fn listing(&self, kind: CapabilityKind, view: ListingView) -> Value {
        let items: Vec<Value> = self
            .catalog(kind)
            .iter()
            .map(|(key, capability)| render(kind, view, key, capability))
            .collect();
        let mut result = Map::new();
        result.insert(kind.result_key().to_string(), Value::Array(items));
        Value::Object(result)
    }
}

fn parse_descriptor(backend: &str, kind: CapabilityKind, entry: &Value) -> Option<Capability> {
    let descriptor = entry.as_object()?;
    let name = descriptor
        .get(kind.id_field())
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())?;
    Some(Capability {
        backend: backend.to_string(),
        name: name.to_string(),
        descriptor: descriptor.clone(),
    })
}

fn render(kind: CapabilityKind, view: ListingView, key: &str, capability: &Capability) -> Value {
    let mut descriptor = capability.descriptor.clone();
    if view == ListingView::Unified {
        descriptor.insert(kind.id_field().to_string(), Value::String(key.to_string()));
    }
    if kind == CapabilityKind::Tool {
        if view == ListingView::Unified {
            let tagged = match descriptor.get("description").and_then(Value::as_str) {
                Some(d) if !d.is_empty() => format!("[{}] {d}", capability.backend),
                _ => format!("[{}]", capability.backend),
            };
            descriptor.insert("description".to_string(), Value::String(tagged));
        }
        if !descriptor.get("inputSchema").is_some_and(Value::is_object) {
            descriptor.insert(
                "inputSchema".to_string(),
                json!({"type": "object", "properties": {}}),
            );
        }
    }
    Value::Object(descriptor)
}

fn truncate_for_log(value: &Value) -> String {
    let mut text = value.to_string();
    if text.len() > 200 {
        let mut cut = 200;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

/// Published registry snapshots.
///
/// `publish` is the only writer and is serialized internally. The merged
/// view is rebuilt in configured backend order on every publish, so the
/// unified listing is stable regardless of which backend became Ready first.
pub struct CapabilityRegistry {
    order: Vec<String>,
    per_backend: ArcSwap<HashMap<String, Arc<Registry>>>,
    merged: ArcSwap<Registry>,
    writer: Mutex<()>,
}

impl CapabilityRegistry {
    /// `order` is the configured backend order.
    pub fn new(order: Vec<String>) -> Self {
        Self {
            order,
            per_backend: ArcSwap::from_pointee(HashMap::new()),
            merged: ArcSwap::from_pointee(Registry::default()),
            writer: Mutex::new(()),
        }
    }

    /// Publish a backend's registry at its Ready transition.
    pub fn publish(&self, backend: &str, registry: Registry) {
        let _guard = self.writer.lock();
        let tools = registry.tool_count();

        let mut map = HashMap::clone(&self.per_backend.load());
        map.insert(backend.to_string(), Arc::new(registry));

        let mut ordered: Vec<&Registry> = self
            .order
            .iter()
            .filter_map(|name| map.get(name).map(Arc::as_ref))
            .collect();
        for (name, registry) in &map {
            if !self.order.contains(name) {
                ordered.push(registry);
            }
        }
        let merged = Registry::merge(ordered);

        self.per_backend.store(Arc::new(map));
        self.merged.store(Arc::new(merged));
        info!("Registered {tools} tools from {backend}");
    }

    /// Routed-mode view of one backend. `None` until it is Ready.
    pub fn backend(&self, name: &str) -> Option<Arc<Registry>> {
        self.per_backend.load().get(name).cloned()
    }

    /// Unified-mode view.
    pub fn merged(&self) -> Arc<Registry> {
        self.merged.load_full()
    }

    pub fn tool_count(&self, name: &str) -> usize {
        self.per_backend
            .load()
            .get(name)
            .map_or(0, |registry| registry.tool_count())
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("backends", &self.per_backend.load().len())
            .field("merged_tools", &self.merged.load().tool_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn discovery(tools: Vec<Value>) -> Discovery {
        Discovery {
            tools,
            ..Discovery::default()
        }
    }

    #[test]
    fn test_split_on_first_separator() {
        assert_eq!(split_namespaced("github___search"), Some(("github", "search")));
        assert_eq!(
            split_namespaced("fs___read___file"),
            Some(("fs", "read___file"))
        );
        assert_eq!(split_namespaced("nosep"), None);
        assert_eq!(split_namespaced("___tool"), None);
        assert_eq!(split_namespaced("backend___"), None);
    }

    #[test]
    fn test_heterodox_schemas_are_kept_opaque() {
        let registry = Registry::from_discovery(
            "b",
            &discovery(vec![
                json!({"name": "draft07", "inputSchema": {"$schema": "http://json-schema.org/draft-07/schema#", "type": "object"}}),
                json!({"name": "modern", "inputSchema": {"$schema": "https://json-schema.org/draft/2020-12/schema", "$defs": {"x": {}}, "prefixItems": [true]}}),
                json!({"name": "weird", "inputSchema": "not even an object"}),
            ]),
        );
        assert_eq!(registry.tool_count(), 3);
        let modern = registry.resolve(CapabilityKind::Tool, "modern").unwrap();
        assert_eq!(modern.descriptor["inputSchema"]["prefixItems"], json!([true]));
    }

    #[test]
    fn test_unusable_entries_are_skipped_not_fatal() {
        let registry = Registry::from_discovery(
            "b",
            &discovery(vec![
                json!("string entry"),
                json!({"description": "no name"}),
                json!({"name": 42}),
                json!({"name": ""}),
                json!({"name": "ok"}),
                json!({"name": "ok", "description": "duplicate"}),
            ]),
        );
        assert_eq!(registry.tool_count(), 1);
        assert!(registry.catalog(CapabilityKind::Tool).contains("ok"));
    }

    #[test]
    fn test_unified_listing_namespaces_and_tags() {
        let a = Registry::from_discovery(
            "alpha",
            &discovery(vec![json!({"name": "search", "description": "Find things", "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}}})]),
        );
        let b = Registry::from_discovery("beta", &discovery(vec![json!({"name": "search"})]));
        let merged = Registry::merge([&a, &b]);

        let listing = merged.listing(CapabilityKind::Tool, ListingView::Unified);
        let tools = listing["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], json!("alpha___search"));
        assert_eq!(tools[0]["description"], json!("[alpha] Find things"));
        assert_eq!(tools[0]["inputSchema"]["properties"]["q"]["type"], json!("string"));
        assert_eq!(tools[1]["name"], json!("beta___search"));
        assert_eq!(tools[1]["description"], json!("[beta]"));
        assert_eq!(
            tools[1]["inputSchema"],
            json!({"type": "object", "properties": {}})
        );

        let owner = merged.resolve(CapabilityKind::Tool, "beta___search").unwrap();
        assert_eq!(owner.backend, "beta");
        assert_eq!(owner.name, "search");
    }

    #[test]
    fn test_routed_listing_keeps_bare_names() {
        let registry = Registry::from_discovery(
            "alpha",
            &discovery(vec![json!({"name": "search", "description": "Find"})]),
        );
        let listing = registry.listing(CapabilityKind::Tool, ListingView::Routed);
        assert_eq!(listing["tools"][0]["name"], json!("search"));
        assert_eq!(listing["tools"][0]["description"], json!("Find"));
    }

    #[test]
    fn test_resources_namespaced_by_uri() {
        let registry = Registry::from_discovery(
            "files",
            &Discovery {
                resources: vec![json!({"uri": "file:///etc/hosts", "name": "hosts"})],
                ..Discovery::default()
            },
        );
        let merged = Registry::merge([&registry]);
        let listing = merged.listing(CapabilityKind::Resource, ListingView::Unified);
        assert_eq!(listing["resources"][0]["uri"], json!("files___file:///etc/hosts"));
        let (backend, uri) = split_namespaced("files___file:///etc/hosts").unwrap();
        assert_eq!(backend, "files");
        assert_eq!(
            merged
                .resolve(CapabilityKind::Resource, "files___file:///etc/hosts")
                .unwrap()
                .name,
            uri
        );
    }

    #[test]
    fn test_resolve_unknown_is_routing_error() {
        let merged = Registry::default();
        let err = merged.resolve(CapabilityKind::Tool, "x___y").unwrap_err();
        assert_eq!(err.to_jsonrpc_code(), -32601);
    }

    #[test]
    fn test_publish_orders_merged_view_by_configuration() {
        let registry = CapabilityRegistry::new(vec!["first".into(), "second".into()]);
        registry.publish(
            "second",
            Registry::from_discovery("second", &discovery(vec![json!({"name": "t"})])),
        );
        registry.publish(
            "first",
            Registry::from_discovery("first", &discovery(vec![json!({"name": "t"})])),
        );

        let listing = registry
            .merged()
            .listing(CapabilityKind::Tool, ListingView::Unified);
        assert_eq!(listing["tools"][0]["name"], json!("first___t"));
        assert_eq!(listing["tools"][1]["name"], json!("second___t"));
        assert_eq!(registry.tool_count("first"), 1);
        assert!(registry.backend("missing").is_none());
    }

    #[test]
    fn test_snapshot_held_by_reader_is_unaffected_by_publish() {
        let registry = CapabilityRegistry::new(vec!["a".into(), "b".into()]);
        registry.publish("a", Registry::from_discovery("a", &discovery(vec![json!({"name": "t"})])));
        let snapshot = registry.merged();
        registry.publish("b", Registry::from_discovery("b", &discovery(vec![json!({"name": "t"})])));
        assert_eq!(snapshot.tool_count(), 1);
        assert_eq!(registry.merged().tool_count(), 2);
    }

    fn backend_name() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_.\\-]{1,8}".prop_filter("backend name rejected by config", |name| {
            crate::config::parse_json(&format!(r#"{{"mcpServers": {{"{name}": {{"command": "cat"}}}}}}"#))
                .is_ok()
        })
    }

    #[test]
    fn test_trailing_underscore_cannot_shadow_another_backend() {
        assert!(!is_namespace_safe("a_"));
        assert!(is_namespace_safe("a_b"));

        let merged = Registry::merge(&[
            Registry::from_discovery("a", &discovery(vec![json!({"name": "_t"})])),
            Registry::from_discovery("a__b", &discovery(vec![json!({"name": "t"})])),
        ]);
        assert_eq!(merged.tool_count(), 2);
        let capability = merged.resolve(CapabilityKind::Tool, "a____t").unwrap();
        assert_eq!(capability.backend, "a");
    }

    proptest! {
        #[test]
        fn prop_merged_size_is_sum_without_collisions(
            backends in proptest::collection::btree_map(
                backend_name(),
                proptest::collection::btree_set("[a-z_]{1,8}", 0..6),
                1..5,
            )
        ) {
            let registries: Vec<Registry> = backends
                .iter()
                .map(|(backend, tools)| {
                    let tools = tools.iter().map(|t| json!({"name": t})).collect();
                    Registry::from_discovery(backend, &discovery(tools))
                })
                .collect();
            let merged = Registry::merge(&registries);
            let expected: usize = backends.values().map(|t| t.len()).sum();
            prop_assert_eq!(merged.tool_count(), expected);

            for (backend, tools) in &backends {
                for tool in tools {
                    let key = namespaced(backend, tool);
                    let (owner, bare) = split_namespaced(&key).unwrap();
                    prop_assert_eq!(owner, backend.as_str());
                    prop_assert_eq!(bare, tool.as_str());
                    let capability = merged.resolve(CapabilityKind::Tool, &key).unwrap();
                    prop_assert_eq!(&capability.backend, backend);
                }
            }
        }
    }
}
