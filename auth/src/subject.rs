// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subjects: the protected resources a check is made against
//!
//! A check can target a concrete resource instance, a subject type as a
//! class, or one named field of either.  Whatever the caller hands in is
//! first normalized into a [`Subject`] (plus an optional field name) before
//! the decision algorithm runs.  Equality and caching use `(type, id)` only;
//! the backing object reference exists purely for convenience (association
//! traversal during master delegation) and is held weakly so a subject never
//! keeps a resource alive.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::sync::Weak;
use warden_common::Error;

/// Sentinel id identifying a subject type as a class rather than a concrete
/// instance
pub const CLASS_ID: &str = "class";

/// A resource instance the engine can be asked about
///
/// Implemented by the host application's domain objects (or thin wrappers
/// around them).  `related` resolves an association path to another
/// resource; it backs master delegation and may simply return `None` when an
/// object has no associations.
pub trait Resource: fmt::Debug + Send + Sync {
    /// Type name of this resource, the key into the permission configuration
    fn type_name(&self) -> &str;

    /// Natural id of this instance, or `None` when the instance has not been
    /// assigned one yet
    fn resource_id(&self) -> Option<String>;

    /// Resolves an association path to a related resource
    fn related(&self, path: &str) -> Option<Arc<dyn Resource>>;
}

/// Identifies either a concrete resource instance or a subject type as a
/// class (`id == `[`CLASS_ID`])
#[derive(Clone)]
pub struct Subject {
    type_name: String,
    id: String,
    object: Option<Weak<dyn Resource>>,
}

impl Subject {
    /// Builds a subject identifying the given resource instance
    ///
    /// Fails with [`Error::InvalidSubject`] when the resource is untyped or
    /// has no id.
    pub fn from_resource(resource: &Arc<dyn Resource>) -> Result<Subject, Error> {
        let type_name = resource.type_name();
        if type_name.is_empty() {
            return Err(Error::invalid_subject("resource has no type name"));
        }
        let id = match resource.resource_id() {
            Some(id) if !id.is_empty() => id,
            _ => return Err(Error::invalid_subject("resource has no id")),
        };
        Ok(Subject {
            type_name: type_name.to_owned(),
            id,
            object: Some(Arc::downgrade(resource)),
        })
    }

    /// Builds a class-level subject for the given type
    pub fn class<S: Into<String>>(type_name: S) -> Subject {
        Subject {
            type_name: type_name.into(),
            id: String::from(CLASS_ID),
            object: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this subject identifies a type as a class rather than an
    /// instance
    pub fn is_class(&self) -> bool {
        self.id == CLASS_ID
    }

    /// Upgrades the weak backing reference, if the caller still holds the
    /// resource
    pub fn object(&self) -> Option<Arc<dyn Resource>> {
        self.object.as_ref()?.upgrade()
    }

    /// Cache key for per-subject state
    pub(crate) fn key(&self) -> (String, String) {
        (self.type_name.clone(), self.id.clone())
    }
}

impl PartialEq for Subject {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.id == other.id
    }
}

impl Eq for Subject {}

impl PartialOrd for Subject {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Subject {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.type_name, &self.id).cmp(&(&other.type_name, &other.id))
    }
}

impl std::hash::Hash for Subject {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Impl'd by hand so the backing object (which may be an arbitrary
        // domain type) never shows up in log messages.
        f.debug_struct("Subject")
            .field("type_name", &self.type_name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A request to authorize access to one named field of a subject
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldVote {
    pub subject: Subject,
    pub field: String,
}

impl FieldVote {
    pub fn new(subject: Subject, field: &str) -> FieldVote {
        FieldVote { subject, field: field.to_owned() }
    }
}

/// The polymorphic subject argument accepted by the decision entry points
///
/// Callers hand in whatever they have: nothing, a type name, a live
/// resource, an already-built [`Subject`], or a [`FieldVote`].
/// [`SubjectSpec::resolve`] normalizes all of them to
/// `(Option<Subject>, Option<field>)`.
#[derive(Clone, Debug)]
pub enum SubjectSpec {
    /// No subject: the check is against system-wide grants
    None,
    /// A subject type as a class
    Class(String),
    /// A concrete resource instance
    Object(Arc<dyn Resource>),
    /// An already-normalized subject
    Subject(Subject),
    /// A field of another spec's subject
    Field(Box<SubjectSpec>, String),
}

impl SubjectSpec {
    /// Normalizes the spec into a subject and an optional field name
    pub fn resolve(&self) -> Result<(Option<Subject>, Option<String>), Error> {
        match self {
            SubjectSpec::None => Ok((None, None)),
            SubjectSpec::Class(type_name) => {
                if type_name.is_empty() {
                    return Err(Error::invalid_subject("empty type name"));
                }
                Ok((Some(Subject::class(type_name.clone())), None))
            }
            SubjectSpec::Object(resource) => {
                Ok((Some(Subject::from_resource(resource)?), None))
            }
            SubjectSpec::Subject(subject) => Ok((Some(subject.clone()), None)),
            SubjectSpec::Field(inner, field) => {
                if field.is_empty() {
                    return Err(Error::invalid_subject("empty field name"));
                }
                let (subject, _) = inner.resolve()?;
                let subject = subject.ok_or_else(|| {
                    Error::invalid_subject("field vote requires a subject")
                })?;
                Ok((Some(subject), Some(field.clone())))
            }
        }
    }
}

impl From<&str> for SubjectSpec {
    fn from(type_name: &str) -> SubjectSpec {
        SubjectSpec::Class(type_name.to_owned())
    }
}

impl From<String> for SubjectSpec {
    fn from(type_name: String) -> SubjectSpec {
        SubjectSpec::Class(type_name)
    }
}

impl From<Arc<dyn Resource>> for SubjectSpec {
    fn from(resource: Arc<dyn Resource>) -> SubjectSpec {
        SubjectSpec::Object(resource)
    }
}

impl From<&Arc<dyn Resource>> for SubjectSpec {
    fn from(resource: &Arc<dyn Resource>) -> SubjectSpec {
        SubjectSpec::Object(Arc::clone(resource))
    }
}

impl From<Subject> for SubjectSpec {
    fn from(subject: Subject) -> SubjectSpec {
        SubjectSpec::Subject(subject)
    }
}

impl From<&Subject> for SubjectSpec {
    fn from(subject: &Subject) -> SubjectSpec {
        SubjectSpec::Subject(subject.clone())
    }
}

impl From<FieldVote> for SubjectSpec {
    fn from(vote: FieldVote) -> SubjectSpec {
        SubjectSpec::Field(
            Box::new(SubjectSpec::Subject(vote.subject)),
            vote.field,
        )
    }
}

impl From<()> for SubjectSpec {
    fn from(_: ()) -> SubjectSpec {
        SubjectSpec::None
    }
}

impl From<Option<Subject>> for SubjectSpec {
    fn from(subject: Option<Subject>) -> SubjectSpec {
        match subject {
            Some(subject) => SubjectSpec::Subject(subject),
            None => SubjectSpec::None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::CLASS_ID;
    use super::FieldVote;
    use super::Resource;
    use super::Subject;
    use super::SubjectSpec;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use warden_common::Error;

    #[derive(Debug)]
    struct Widget {
        id: Option<String>,
    }

    impl Resource for Widget {
        fn type_name(&self) -> &str {
            "Widget"
        }

        fn resource_id(&self) -> Option<String> {
            self.id.clone()
        }

        fn related(&self, _: &str) -> Option<Arc<dyn Resource>> {
            None
        }
    }

    #[test]
    fn test_subject_equality_ignores_backing_object() {
        let widget: Arc<dyn Resource> =
            Arc::new(Widget { id: Some(String::from("w1")) });
        let from_object = Subject::from_resource(&widget).unwrap();
        let from_parts = Subject {
            type_name: String::from("Widget"),
            id: String::from("w1"),
            object: None,
        };
        assert_eq!(from_object, from_parts);
        assert!(from_object.object().is_some());

        // Dropping the resource must not change identity, only the
        // convenience reference.
        drop(widget);
        assert!(from_object.object().is_none());
        assert_eq!(from_object, from_parts);
    }

    #[test]
    fn test_unidentified_resource_is_invalid() {
        let widget: Arc<dyn Resource> = Arc::new(Widget { id: None });
        assert_matches!(
            Subject::from_resource(&widget),
            Err(Error::InvalidSubject { .. })
        );
    }

    #[test]
    fn test_spec_resolution() {
        let (subject, field) =
            SubjectSpec::from("Widget").resolve().unwrap();
        let subject = subject.unwrap();
        assert_eq!(subject.id(), CLASS_ID);
        assert!(subject.is_class());
        assert_eq!(field, None);

        let vote = FieldVote::new(Subject::class("Widget"), "price");
        let (subject, field) = SubjectSpec::from(vote).resolve().unwrap();
        assert_eq!(subject.unwrap().type_name(), "Widget");
        assert_eq!(field.as_deref(), Some("price"));

        let (subject, field) = SubjectSpec::None.resolve().unwrap();
        assert!(subject.is_none());
        assert!(field.is_none());

        assert_matches!(
            SubjectSpec::Class(String::new()).resolve(),
            Err(Error::InvalidSubject { .. })
        );
        assert_matches!(
            SubjectSpec::Field(Box::new(SubjectSpec::None), "f".into())
                .resolve(),
            Err(Error::InvalidSubject { .. })
        );
    }
}
