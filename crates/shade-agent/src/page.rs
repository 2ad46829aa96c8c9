//! Minimal page model the agent observes.
//!
//! A [`Document`] owns every node through a strong `Arc`. Everything else in
//! the agent holds `Weak` references, so removing a node from the document
//! is enough to invalidate it everywhere.

use crate::classifier::FieldDescriptor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

/// Stable identity of a node. Ids grow monotonically, so ordering by id is
/// document (insertion) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Form,
    Input,
    Button,
    Link,
    Element,
}

/// Something that happened on the page and that the agent may react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// The structural tree gained nodes.
    NodesAdded,
    /// The value of an input changed.
    Input { node: NodeId },
    Submit { form: NodeId },
    Click { node: NodeId },
    /// The document was replaced in place (e.g. client-side routing).
    Navigated,
}

#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    tag: String,
    control_type: String,
    name: String,
    element_id: String,
    class_name: String,
    placeholder: String,
    max_length: Option<u32>,
    autocomplete: String,
    input_mode: String,
    text: String,
    href: Option<String>,
    form: Option<NodeId>,
    value: Mutex<String>,
    invalid: AtomicBool,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn control_type(&self) -> &str {
        &self.control_type
    }

    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    pub fn form(&self) -> Option<NodeId> {
        self.form
    }

    pub fn value(&self) -> String {
        lock(&self.value).clone()
    }

    pub fn set_value(&self, value: impl Into<String>) {
        *lock(&self.value) = value.into();
    }

    /// Whether the page flagged this control as invalid (`aria-invalid`).
    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::Relaxed)
    }

    pub fn set_invalid(&self, invalid: bool) {
        self.invalid.store(invalid, Ordering::Relaxed);
    }

    /// A value-bearing form control (submit-type inputs excluded).
    pub fn is_field(&self) -> bool {
        self.kind == NodeKind::Input && !self.is_submit_input()
    }

    /// A control whose click may complete a login: buttons and
    /// submit/image inputs.
    pub fn is_submit_control(&self) -> bool {
        match self.kind {
            NodeKind::Button => true,
            NodeKind::Input => self.is_submit_input(),
            _ => false,
        }
    }

    fn is_submit_input(&self) -> bool {
        matches!(
            self.control_type.to_ascii_lowercase().as_str(),
            "submit" | "image"
        )
    }

    /// Immutable snapshot of the attributes the classifier looks at.
    pub fn descriptor(&self) -> FieldDescriptor {
        FieldDescriptor {
            control_type: self.control_type.clone(),
            name: self.name.clone(),
            id: self.element_id.clone(),
            placeholder: self.placeholder.clone(),
            class_name: self.class_name.clone(),
            max_length: self.max_length,
            autocomplete: self.autocomplete.clone(),
            input_mode: self.input_mode.clone(),
        }
    }
}

/// Builder for nodes inserted into a [`Document`].
#[derive(Debug, Clone)]
pub struct NodeSpec {
    kind: NodeKind,
    tag: String,
    control_type: String,
    name: String,
    element_id: String,
    class_name: String,
    placeholder: String,
    max_length: Option<u32>,
    autocomplete: String,
    input_mode: String,
    text: String,
    href: Option<String>,
    form: Option<NodeId>,
    value: String,
    invalid: bool,
}

impl NodeSpec {
    fn new(kind: NodeKind, tag: &str) -> Self {
        Self {
            kind,
            tag: tag.to_string(),
            control_type: String::new(),
            name: String::new(),
            element_id: String::new(),
            class_name: String::new(),
            placeholder: String::new(),
            max_length: None,
            autocomplete: String::new(),
            input_mode: String::new(),
            text: String::new(),
            href: None,
            form: None,
            value: String::new(),
            invalid: false,
        }
    }

    pub fn form() -> Self {
        Self::new(NodeKind::Form, "form")
    }

    pub fn input(control_type: &str) -> Self {
        let mut spec = Self::new(NodeKind::Input, "input");
        spec.control_type = control_type.to_string();
        spec
    }

    pub fn button(text: &str) -> Self {
        let mut spec = Self::new(NodeKind::Button, "button");
        spec.control_type = "submit".to_string();
        spec.text = text.to_string();
        spec
    }

    pub fn link(text: &str, href: &str) -> Self {
        let mut spec = Self::new(NodeKind::Link, "a");
        spec.text = text.to_string();
        spec.href = Some(href.to_string());
        spec
    }

    pub fn element(tag: &str) -> Self {
        Self::new(NodeKind::Element, tag)
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn id(mut self, id: &str) -> Self {
        self.element_id = id.to_string();
        self
    }

    pub fn class(mut self, class_name: &str) -> Self {
        self.class_name = class_name.to_string();
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = placeholder.to_string();
        self
    }

    pub fn max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn autocomplete(mut self, hint: &str) -> Self {
        self.autocomplete = hint.to_string();
        self
    }

    pub fn input_mode(mut self, hint: &str) -> Self {
        self.input_mode = hint.to_string();
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn in_form(mut self, form: NodeId) -> Self {
        self.form = Some(form);
        self
    }

    pub fn invalid(mut self) -> Self {
        self.invalid = true;
        self
    }

    fn build(self, id: NodeId) -> Node {
        Node {
            id,
            kind: self.kind,
            tag: self.tag,
            control_type: self.control_type,
            name: self.name,
            element_id: self.element_id,
            class_name: self.class_name,
            placeholder: self.placeholder,
            max_length: self.max_length,
            autocomplete: self.autocomplete,
            input_mode: self.input_mode,
            text: self.text,
            href: self.href,
            form: self.form,
            value: Mutex::new(self.value),
            invalid: AtomicBool::new(self.invalid),
        }
    }
}

/// Read access the agent needs from a live page.
pub trait Page: Send + Sync {
    /// Current location (full URL).
    fn location(&self) -> String;

    /// All nodes currently attached, in document order.
    fn nodes(&self) -> Vec<Arc<Node>>;

    fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes().into_iter().find(|n| n.id() == id)
    }

    /// Lower-cased host of the current location. Falls back to the raw
    /// location when it does not parse as a URL.
    fn origin(&self) -> String {
        let location = self.location();
        match Url::parse(&location) {
            Ok(url) => url
                .host_str()
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or(location),
            Err(_) => location,
        }
    }
}

struct DocumentState {
    location: String,
    nodes: Vec<Arc<Node>>,
    next_id: u64,
}

/// In-memory page, fed by a browser bridge or by tests.
pub struct Document {
    state: Mutex<DocumentState>,
}

impl Document {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(DocumentState {
                location: location.into(),
                nodes: Vec::new(),
                next_id: 1,
            }),
        }
    }

    pub fn append(&self, spec: NodeSpec) -> NodeId {
        let mut state = lock(&self.state);
        let id = NodeId(state.next_id);
        state.next_id += 1;
        state.nodes.push(Arc::new(spec.build(id)));
        id
    }

    /// Detaches a node. Returns false if it was not attached.
    pub fn remove(&self, id: NodeId) -> bool {
        let mut state = lock(&self.state);
        let before = state.nodes.len();
        state.nodes.retain(|n| n.id() != id);
        state.nodes.len() != before
    }

    pub fn set_value(&self, id: NodeId, value: &str) -> bool {
        match self.node(id) {
            Some(node) => {
                node.set_value(value);
                true
            }
            None => false,
        }
    }

    pub fn set_invalid(&self, id: NodeId, invalid: bool) -> bool {
        match self.node(id) {
            Some(node) => {
                node.set_invalid(invalid);
                true
            }
            None => false,
        }
    }

    pub fn navigate(&self, location: impl Into<String>) {
        lock(&self.state).location = location.into();
    }

    pub fn len(&self) -> usize {
        lock(&self.state).nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Page for Document {
    fn location(&self) -> String {
        lock(&self.state).location.clone()
    }

    fn nodes(&self) -> Vec<Arc<Node>> {
        lock(&self.state).nodes.clone()
    }

    fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        lock(&self.state)
            .nodes
            .iter()
            .find(|n| n.id() == id)
            .cloned()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_lowercase_host() {
        let doc = Document::new("https://Accounts.Example.com/login?next=/");
        assert_eq!(doc.origin(), "accounts.example.com");
    }

    #[test]
    fn removing_a_node_drops_the_document_reference() {
        let doc = Document::new("https://example.com");
        let id = doc.append(NodeSpec::input("password"));
        let weak = Arc::downgrade(&doc.node(id).unwrap());

        assert!(doc.remove(id));
        assert!(weak.upgrade().is_none());
        assert!(!doc.remove(id));
    }

    #[test]
    fn submit_inputs_are_controls_not_fields() {
        let doc = Document::new("https://example.com");
        let submit = doc.append(NodeSpec::input("submit"));
        let text = doc.append(NodeSpec::input("text"));

        let submit = doc.node(submit).unwrap();
        assert!(submit.is_submit_control());
        assert!(!submit.is_field());

        let text = doc.node(text).unwrap();
        assert!(text.is_field());
        assert!(!text.is_submit_control());
    }
}
