//! Operation classification heuristics.
//!
//! Providers publish operation catalogs, not capability declarations, so the
//! registry has to decide what each operation *is*. Classification looks at
//! the operation name first (verb prefixes survive across naming conventions)
//! and falls back to HTTP method plus path shape when the name is
//! uninformative.

use toolforge_types::OperationKind;

use crate::models::OperationDescriptor;

/// Classify a catalog operation into its kind.
pub fn classify_operation(operation: &OperationDescriptor) -> OperationKind {
    if let Some(kind) = classify_by_name(&operation.name) {
        return kind;
    }
    if let (Some(method), Some(path)) = (operation.method.as_deref(), operation.path.as_deref())
        && let Some(kind) = classify_by_http(method, path)
    {
        return kind;
    }
    OperationKind::Other
}

/// Infer the resource an operation targets (e.g. "issues").
///
/// Prefers the last concrete path segment, mirroring how REST catalogs group
/// endpoints; otherwise takes the trailing name token after the verb.
pub fn infer_resource(operation: &OperationDescriptor) -> String {
    if let Some(path) = operation.path.as_deref() {
        let concrete = path
            .trim_start_matches('/')
            .split('/')
            .rev()
            .find(|segment| !segment.is_empty() && !segment.starts_with('{') && !segment.starts_with(':'));
        if let Some(segment) = concrete {
            return segment.to_string();
        }
    }

    let tokens = name_tokens(&operation.name);
    match tokens.split_first() {
        Some((first, rest)) if !rest.is_empty() && VERBS.contains(&first.as_str()) => rest.join("_"),
        _ => operation.name.clone(),
    }
}

const VERBS: &[&str] = &[
    "list", "get", "fetch", "read", "create", "add", "post", "update", "patch", "edit", "set", "delete", "remove", "destroy",
    "search", "query", "find",
];

fn classify_by_name(name: &str) -> Option<OperationKind> {
    let tokens = name_tokens(name);
    let verb = tokens.first()?;
    let kind = match verb.as_str() {
        "list" => OperationKind::List,
        "get" | "fetch" | "read" => OperationKind::Get,
        "create" | "add" | "post" => OperationKind::Create,
        "update" | "patch" | "edit" | "set" => OperationKind::Update,
        "delete" | "remove" | "destroy" => OperationKind::Delete,
        "search" | "query" | "find" => OperationKind::Search,
        _ => return None,
    };
    Some(kind)
}

/// Method/path fallback: a GET ending in a placeholder is a single-resource
/// read; a GET ending in a collection segment is a listing.
fn classify_by_http(method: &str, path: &str) -> Option<OperationKind> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    let ends_in_placeholder = segments
        .last()
        .map(|segment| segment.starts_with('{') || segment.starts_with(':'))
        .unwrap_or(false);

    match method.to_ascii_uppercase().as_str() {
        "GET" if ends_in_placeholder => Some(OperationKind::Get),
        "GET" => Some(OperationKind::List),
        "POST" => Some(OperationKind::Create),
        "PATCH" | "PUT" => Some(OperationKind::Update),
        "DELETE" => Some(OperationKind::Delete),
        _ => None,
    }
}

/// Split an operation name on the separators seen in the wild:
/// `list_issues`, `issues.search`, `issues:list`, `listIssues`.
fn name_tokens(name: &str) -> Vec<String> {
    let mut spaced = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            spaced.push(' ');
            spaced.push(ch.to_ascii_lowercase());
        } else if ch == '_' || ch == '.' || ch == ':' || ch == '-' || ch == '/' {
            spaced.push(' ');
        } else {
            spaced.push(ch);
        }
    }
    let mut tokens: Vec<String> = spaced.split_whitespace().map(str::to_string).collect();
    // Catalogs name operations both verb-first ("list_issues") and
    // resource-first ("issues.list"); normalize to verb-first.
    if tokens.len() > 1 && !VERBS.contains(&tokens[0].as_str()) && VERBS.contains(&tokens[tokens.len() - 1].as_str()) {
        tokens.rotate_right(1);
    }
    tokens
}
