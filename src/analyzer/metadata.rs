//! Metadata extraction: a method plus its owning type to `NodeMetadata` and
//! a `NodeType`. Pure; absent data falls back to defaults.

use crate::annotations::{self, ROUTES};
use crate::index::{Annotation, MethodInfo, TypeInfo, listened_event};
use crate::model::{NodeMetadata, NodeType, TransactionPropagation};

pub fn extract(method: &MethodInfo, owner: Option<&TypeInfo>) -> (NodeMetadata, NodeType) {
    let owner_annotations: &[Annotation] = owner.map(|t| t.annotations.as_slice()).unwrap_or(&[]);
    let node_type = classify(method, owner);

    let mut metadata = NodeMetadata {
        annotations: method.annotations.iter().map(|a| a.name.clone()).collect(),
        visibility: method.visibility,
        is_static: method.is_static,
        parameter_types: method.parameter_types.clone(),
        return_type: method.return_type.clone(),
        line_number: method.line.unwrap_or(-1),
        ..NodeMetadata::default()
    };

    metadata.is_async = annotations::find(&method.annotations, annotations::ASYNC).is_some()
        || annotations::find(owner_annotations, annotations::ASYNC).is_some();

    let transactional = annotations::find(&method.annotations, annotations::TRANSACTIONAL)
        .or_else(|| annotations::find(owner_annotations, annotations::TRANSACTIONAL));
    if let Some(tx) = transactional {
        metadata.is_transactional = true;
        metadata.transaction_propagation = tx
            .attribute("propagation")
            .and_then(TransactionPropagation::parse)
            .unwrap_or(TransactionPropagation::Required);
    }

    if node_type == NodeType::Controller {
        if let Some((verb, path)) = route(method, owner_annotations) {
            metadata.http_method = Some(verb);
            metadata.http_path = Some(path);
        }
    }

    metadata.event_class = listened_event(method);

    (metadata, node_type)
}

/// Owner annotations first, then the method's own; abstract owners with no
/// stereotype are interfaces.
pub fn classify(method: &MethodInfo, owner: Option<&TypeInfo>) -> NodeType {
    let by_owner = owner.and_then(|t| annotations::stereotype_of(&t.annotations));
    let stereotype = by_owner.or_else(|| annotations::stereotype_of(&method.annotations));
    match stereotype {
        Some(stereotype) => stereotype.node_type(),
        None if owner.is_some_and(|t| t.kind.is_abstract()) => NodeType::Interface,
        None => NodeType::Unknown,
    }
}

fn route(method: &MethodInfo, owner_annotations: &[Annotation]) -> Option<(String, String)> {
    let (annotation, verb) = method.annotations.iter().find_map(|annotation| {
        ROUTES
            .iter()
            .find(|(name, _)| annotation.is(name))
            .map(|(_, verb)| (annotation, *verb))
    })?;

    let verb = if annotation.is(annotations::REQUEST_MAPPING) {
        annotation
            .attribute("method")
            .map(|raw| clean_value(raw.rsplit('.').next().unwrap_or(raw)).to_ascii_uppercase())
            .unwrap_or_else(|| verb.to_string())
    } else {
        verb.to_string()
    };

    let prefix = owner_annotations
        .iter()
        .find(|a| a.is(annotations::REQUEST_MAPPING))
        .and_then(mapping_path)
        .unwrap_or_default();
    let path = mapping_path(annotation).unwrap_or_default();
    Some((verb, join_paths(&prefix, &path)))
}

fn mapping_path(annotation: &Annotation) -> Option<String> {
    annotation
        .attribute("value")
        .or_else(|| annotation.attribute("path"))
        .map(clean_value)
}

/// Unwraps `"x"`, `{"x"}` and `["x"]`; path variables like `/{id}` survive.
fn clean_value(raw: &str) -> String {
    let value = raw.trim();
    let value = match value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        Some(inner) => inner,
        None if value.starts_with("{\"") => value
            .strip_prefix('{')
            .and_then(|v| v.strip_suffix('}'))
            .unwrap_or(value),
        None => value,
    };
    value.trim().trim_matches('"').trim().to_string()
}

fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let joined = match (prefix.is_empty(), path.is_empty()) {
        (true, true) => String::new(),
        (false, true) => prefix.to_string(),
        (true, false) => path.to_string(),
        (false, false) => format!("{prefix}/{path}"),
    };
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::TypeKind;
    use crate::model::Visibility;

    fn controller() -> TypeInfo {
        let mut ty = TypeInfo::new("com.example.PaymentController", TypeKind::Class);
        ty.annotations.push(Annotation::new(
            "org.springframework.web.bind.annotation.RestController",
        ));
        ty.annotations.push(
            Annotation::new("org.springframework.web.bind.annotation.RequestMapping")
                .with_attribute("value", "/api/payments"),
        );
        ty
    }

    #[test]
    fn controller_route_joins_class_prefix() {
        let mut method = MethodInfo::new("com.example.PaymentController", "get", &["Long"]);
        method
            .annotations
            .push(Annotation::new("GetMapping").with_attribute("value", "\"/{id}\""));
        let (metadata, node_type) = extract(&method, Some(&controller()));
        assert_eq!(node_type, NodeType::Controller);
        assert_eq!(metadata.http_method.as_deref(), Some("GET"));
        assert_eq!(metadata.http_path.as_deref(), Some("/api/payments/{id}"));
    }

    #[test]
    fn route_without_method_path_uses_prefix() {
        let mut method = MethodInfo::new("com.example.PaymentController", "process", &[]);
        method.annotations.push(Annotation::new("PostMapping"));
        let (metadata, _) = extract(&method, Some(&controller()));
        assert_eq!(metadata.http_method.as_deref(), Some("POST"));
        assert_eq!(metadata.http_path.as_deref(), Some("/api/payments"));
    }

    #[test]
    fn request_mapping_method_attribute() {
        let mut method = MethodInfo::new("com.example.PaymentController", "refund", &[]);
        method.annotations.push(
            Annotation::new("RequestMapping")
                .with_attribute("value", "refund")
                .with_attribute("method", "RequestMethod.PUT"),
        );
        let (metadata, _) = extract(&method, Some(&controller()));
        assert_eq!(metadata.http_method.as_deref(), Some("PUT"));
        assert_eq!(metadata.http_path.as_deref(), Some("/api/payments/refund"));
    }

    #[test]
    fn clean_value_unwraps_arrays_only() {
        assert_eq!(clean_value("{\"/orders\"}"), "/orders");
        assert_eq!(clean_value("[\"/a\"]"), "/a");
        assert_eq!(clean_value("/{id}"), "/{id}");
    }

    #[test]
    fn routes_ignored_outside_controllers() {
        let mut service = TypeInfo::new("com.example.Svc", TypeKind::Class);
        service.annotations.push(Annotation::new("Service"));
        let mut method = MethodInfo::new("com.example.Svc", "get", &[]);
        method.annotations.push(Annotation::new("GetMapping"));
        let (metadata, node_type) = extract(&method, Some(&service));
        assert_eq!(node_type, NodeType::Service);
        assert!(metadata.http_method.is_none());
    }

    #[test]
    fn transactional_propagation_defaults_to_required() {
        let mut owner = TypeInfo::new("com.example.OrderService", TypeKind::Class);
        owner.annotations.push(Annotation::new("Transactional"));
        let method = MethodInfo::new("com.example.OrderService", "create", &[]);
        let (metadata, _) = extract(&method, Some(&owner));
        assert!(metadata.is_transactional);
        assert_eq!(metadata.transaction_propagation, TransactionPropagation::Required);

        let mut explicit = method.clone();
        explicit.annotations.push(
            Annotation::new("org.springframework.transaction.annotation.Transactional")
                .with_attribute("propagation", "Propagation.REQUIRES_NEW"),
        );
        let (metadata, _) = extract(&explicit, Some(&owner));
        assert_eq!(metadata.transaction_propagation, TransactionPropagation::RequiresNew);

        let (plain, _) = extract(&method, None);
        assert!(!plain.is_transactional);
        assert_eq!(plain.transaction_propagation, TransactionPropagation::None);
    }

    #[test]
    fn method_level_markers_and_defaults() {
        let mut method = MethodInfo::new("com.example.Mailer", "onPlaced", &["com.example.OrderPlaced"]);
        method.annotations.push(Annotation::new("Async"));
        method.annotations.push(Annotation::new("EventListener"));
        method.visibility = Visibility::Protected;
        method.line = Some(42);
        let (metadata, node_type) = extract(&method, None);
        assert_eq!(node_type, NodeType::EventListener);
        assert!(metadata.is_async);
        assert_eq!(metadata.event_class.as_deref(), Some("com.example.OrderPlaced"));
        assert_eq!(metadata.annotations, vec!["Async", "EventListener"]);
        assert_eq!(metadata.visibility, Visibility::Protected);
        assert_eq!(metadata.line_number, 42);
        assert_eq!(metadata.return_type, "void");
    }

    #[test]
    fn abstract_owner_without_stereotype_is_interface() {
        let owner = TypeInfo::new("com.example.PaymentGateway", TypeKind::Interface);
        let method = MethodInfo::new("com.example.PaymentGateway", "charge", &[]);
        assert_eq!(classify(&method, Some(&owner)), NodeType::Interface);
        assert_eq!(classify(&method, None), NodeType::Unknown);
    }
}
