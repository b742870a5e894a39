//! Framework annotation vocabulary.
//!
//! Classification is driven by the ordered [`STEREOTYPES`] table instead of
//! substring checks, so precedence is data that tests can inspect.

use crate::index::Annotation;
use crate::model::NodeType;

pub const ASYNC: &[&str] = &["org.springframework.scheduling.annotation.Async"];
pub const TRANSACTIONAL: &[&str] = &[
    "org.springframework.transaction.annotation.Transactional",
    "jakarta.transaction.Transactional",
    "javax.transaction.Transactional",
];
pub const PRIMARY: &[&str] = &["org.springframework.context.annotation.Primary"];
pub const EVENT_LISTENER: &[&str] = &[
    "org.springframework.context.event.EventListener",
    "org.springframework.transaction.event.TransactionalEventListener",
];
pub const REQUEST_MAPPING: &str = "org.springframework.web.bind.annotation.RequestMapping";

/// Route annotations and the HTTP verb each implies.
pub const ROUTES: &[(&str, &str)] = &[
    ("org.springframework.web.bind.annotation.GetMapping", "GET"),
    ("org.springframework.web.bind.annotation.PostMapping", "POST"),
    ("org.springframework.web.bind.annotation.PutMapping", "PUT"),
    ("org.springframework.web.bind.annotation.DeleteMapping", "DELETE"),
    ("org.springframework.web.bind.annotation.PatchMapping", "PATCH"),
    (REQUEST_MAPPING, "REQUEST"),
];

/// Framework role a type can declare through annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stereotype {
    Controller,
    Service,
    Repository,
    Entity,
    Component,
    Configuration,
    EventListener,
}

impl Stereotype {
    pub fn node_type(self) -> NodeType {
        match self {
            Stereotype::Controller => NodeType::Controller,
            Stereotype::Service => NodeType::Service,
            Stereotype::Repository => NodeType::Repository,
            Stereotype::Entity => NodeType::Entity,
            Stereotype::Component => NodeType::Component,
            Stereotype::Configuration => NodeType::Configuration,
            Stereotype::EventListener => NodeType::EventListener,
        }
    }

    /// Whether the container instantiates and injects types carrying this role.
    pub fn is_managed(self) -> bool {
        matches!(
            self,
            Stereotype::Controller
                | Stereotype::Service
                | Stereotype::Repository
                | Stereotype::Component
                | Stereotype::Configuration
        )
    }

    pub fn annotations(self) -> &'static [&'static str] {
        STEREOTYPES
            .iter()
            .find(|(stereotype, _)| *stereotype == self)
            .map(|(_, names)| *names)
            .unwrap_or(&[])
    }
}

/// Classification precedence: earlier rows win.
pub const STEREOTYPES: &[(Stereotype, &[&str])] = &[
    (
        Stereotype::Controller,
        &[
            "org.springframework.stereotype.Controller",
            "org.springframework.web.bind.annotation.RestController",
        ],
    ),
    (Stereotype::Service, &["org.springframework.stereotype.Service"]),
    (
        Stereotype::Repository,
        &["org.springframework.stereotype.Repository"],
    ),
    (
        Stereotype::Entity,
        &["jakarta.persistence.Entity", "javax.persistence.Entity"],
    ),
    (
        Stereotype::Component,
        &["org.springframework.stereotype.Component"],
    ),
    (
        Stereotype::Configuration,
        &["org.springframework.context.annotation.Configuration"],
    ),
    (Stereotype::EventListener, EVENT_LISTENER),
];

/// First stereotype in table order matched by any of `annotations`.
pub fn stereotype_of<'a, I>(annotations: I) -> Option<Stereotype>
where
    I: IntoIterator<Item = &'a Annotation> + Clone,
{
    STEREOTYPES.iter().find_map(|(stereotype, names)| {
        annotations
            .clone()
            .into_iter()
            .any(|annotation| annotation.is_any(names))
            .then_some(*stereotype)
    })
}

/// Every stereotype carried by `annotations`, in table order.
pub fn stereotypes_of(annotations: &[Annotation]) -> Vec<Stereotype> {
    STEREOTYPES
        .iter()
        .filter(|(_, names)| annotations.iter().any(|a| a.is_any(names)))
        .map(|(stereotype, _)| *stereotype)
        .collect()
}

pub fn find<'a>(annotations: &'a [Annotation], names: &[&str]) -> Option<&'a Annotation> {
    annotations.iter().find(|annotation| annotation.is_any(names))
}
