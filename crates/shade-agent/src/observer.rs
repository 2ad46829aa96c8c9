use crate::classifier::{InputRole, classify};
use crate::page::{Node, NodeId, NodeKind, Page};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// A classified field the observer is listening to. The element is held
/// weakly; once the page drops it the entry is dead.
#[derive(Debug)]
pub struct ObservedField {
    pub role: InputRole,
    element: Weak<Node>,
    pub last_value: Option<String>,
}

impl ObservedField {
    pub fn element(&self) -> Option<Arc<Node>> {
        self.element.upgrade()
    }

    pub fn is_live(&self) -> bool {
        self.element.strong_count() > 0
    }
}

/// What a single scan newly registered.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub fields: Vec<(NodeId, InputRole)>,
    pub triggers: Vec<NodeId>,
}

impl ScanReport {
    pub fn found_mfa(&self) -> bool {
        self.fields.iter().any(|(_, role)| *role == InputRole::MfaCode)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.triggers.is_empty()
    }
}

/// Tracks which fields and submit-like controls already have listeners.
///
/// Membership is keyed by node id and never keeps a node alive, so repeated
/// scans only pay for nodes that are not registered yet.
#[derive(Debug, Default)]
pub struct Observer {
    fields: BTreeMap<NodeId, ObservedField>,
    triggers: BTreeMap<NodeId, Weak<Node>>,
}

impl Observer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan(&mut self, page: &dyn Page) -> ScanReport {
        self.prune();

        let mut report = ScanReport::default();
        for node in page.nodes() {
            let id = node.id();

            if node.is_field() && !self.fields.contains_key(&id) {
                let role = classify(&node.descriptor());
                self.fields.insert(
                    id,
                    ObservedField {
                        role,
                        element: Arc::downgrade(&node),
                        last_value: None,
                    },
                );
                report.fields.push((id, role));
            }

            let is_trigger = node.kind() == NodeKind::Form || node.is_submit_control();
            if is_trigger && !self.triggers.contains_key(&id) {
                self.triggers.insert(id, Arc::downgrade(&node));
                report.triggers.push(id);
            }
        }

        if !report.is_empty() {
            debug!(
                fields = report.fields.len(),
                triggers = report.triggers.len(),
                "registered new page elements"
            );
        }
        report
    }

    /// Value-change listener. Returns the role and new value for classified
    /// fields; unregistered, unclassified or detached nodes yield `None`.
    pub fn on_input(&mut self, id: NodeId) -> Option<(InputRole, String)> {
        let field = self.fields.get_mut(&id)?;
        let Some(element) = field.element() else {
            self.fields.remove(&id);
            return None;
        };

        let value = element.value();
        field.last_value = Some(value.clone());
        match field.role {
            InputRole::Unclassified => None,
            role => Some((role, value)),
        }
    }

    /// Whether `id` is a live, registered form or submit control.
    pub fn is_trigger(&self, id: NodeId) -> bool {
        self.triggers
            .get(&id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    pub fn has_live(&self, role: InputRole) -> bool {
        self.fields
            .values()
            .any(|field| field.role == role && field.is_live())
    }

    /// Current value of the first live field with `role`, in document
    /// order, skipping empty ones.
    pub fn first_value(&self, role: InputRole) -> Option<String> {
        self.fields
            .values()
            .filter(|field| field.role == role)
            .filter_map(ObservedField::element)
            .map(|element| element.value())
            .find(|value| !value.is_empty())
    }

    pub fn field(&self, id: NodeId) -> Option<&ObservedField> {
        self.fields.get(&id)
    }

    pub fn tracked(&self) -> usize {
        self.fields.len() + self.triggers.len()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.triggers.clear();
    }

    fn prune(&mut self) {
        self.fields.retain(|_, field| field.is_live());
        self.triggers.retain(|_, weak| weak.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Document, NodeSpec};

    fn login_page() -> (Document, NodeId, NodeId, NodeId) {
        let doc = Document::new("https://example.com/login");
        let form = doc.append(NodeSpec::form());
        let user = doc.append(NodeSpec::input("email").name("email").in_form(form));
        let pass = doc.append(NodeSpec::input("password").name("password").in_form(form));
        doc.append(NodeSpec::button("Sign in").in_form(form));
        (doc, form, user, pass)
    }

    #[test]
    fn scan_is_idempotent() {
        let (doc, form, user, pass) = login_page();
        let mut observer = Observer::new();

        let first = observer.scan(&doc);
        assert_eq!(
            first.fields,
            vec![(user, InputRole::Username), (pass, InputRole::Password)]
        );
        assert_eq!(first.triggers.len(), 2);
        assert!(observer.is_trigger(form));

        let second = observer.scan(&doc);
        assert!(second.is_empty());
        assert_eq!(observer.tracked(), 4);
    }

    #[test]
    fn rescan_picks_up_late_fields() {
        let (doc, _, _, _) = login_page();
        let mut observer = Observer::new();
        observer.scan(&doc);

        let code = doc.append(NodeSpec::input("text").autocomplete("one-time-code"));
        let report = observer.scan(&doc);
        assert_eq!(report.fields, vec![(code, InputRole::MfaCode)]);
        assert!(report.found_mfa());
    }

    #[test]
    fn input_updates_last_value() {
        let (doc, _, user, _) = login_page();
        let mut observer = Observer::new();
        observer.scan(&doc);

        doc.set_value(user, "alice@example.com");
        assert_eq!(
            observer.on_input(user),
            Some((InputRole::Username, "alice@example.com".to_string()))
        );
        assert_eq!(
            observer.field(user).unwrap().last_value.as_deref(),
            Some("alice@example.com")
        );
    }

    #[test]
    fn removed_elements_are_not_kept_alive() {
        let (doc, _, user, pass) = login_page();
        let mut observer = Observer::new();
        observer.scan(&doc);

        doc.remove(pass);
        assert!(!observer.field(pass).unwrap().is_live());
        assert!(!observer.has_live(InputRole::Password));
        assert_eq!(observer.on_input(pass), None);

        observer.scan(&doc);
        assert!(observer.field(pass).is_none());
        assert!(observer.field(user).is_some());
    }

    #[test]
    fn first_value_follows_document_order() {
        let doc = Document::new("https://example.com");
        doc.append(NodeSpec::input("password").value(""));
        doc.append(NodeSpec::input("password").value("first"));
        doc.append(NodeSpec::input("password").value("second"));

        let mut observer = Observer::new();
        observer.scan(&doc);
        assert_eq!(
            observer.first_value(InputRole::Password).as_deref(),
            Some("first")
        );
    }
}
