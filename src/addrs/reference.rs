use super::{InstanceKey, Resource, ResourceInstance};
use crate::hclext::{Diagnostic, SourceRange};
use crate::value::Value;
use std::fmt;

/// One step after the root name of a traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum TraverseStep {
    Attr(String),
    /// Index whose key is a constant.
    Index(Value),
    /// Index computed from other references; its key is not known statically.
    DynamicIndex,
    Splat,
}

/// A reference-shaped expression: a root name followed by steps, as in
/// `var.foo` or `aws_instance.web[0].id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    pub root: String,
    pub steps: Vec<TraverseStep>,
}

impl Traversal {
    pub fn new(root: &str, steps: Vec<TraverseStep>) -> Self {
        Self {
            root: root.to_string(),
            steps,
        }
    }
}

/// The object a reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Referenceable {
    InputVariable(String),
    LocalValue(String),
    PathAttr(String),
    TerraformAttr(String),
    Resource(Resource),
    ResourceInstance(ResourceInstance),
    ModuleCall(String),
    CountAttr(String),
    ForEachAttr(String),
}

impl fmt::Display for Referenceable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Referenceable::InputVariable(name) => write!(f, "var.{name}"),
            Referenceable::LocalValue(name) => write!(f, "local.{name}"),
            Referenceable::PathAttr(name) => write!(f, "path.{name}"),
            Referenceable::TerraformAttr(name) => write!(f, "terraform.{name}"),
            Referenceable::Resource(r) => write!(f, "{r}"),
            Referenceable::ResourceInstance(r) => write!(f, "{r}"),
            Referenceable::ModuleCall(name) => write!(f, "module.{name}"),
            Referenceable::CountAttr(name) => write!(f, "count.{name}"),
            Referenceable::ForEachAttr(name) => write!(f, "each.{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub subject: Referenceable,
    pub source_range: SourceRange,
    pub remaining: Vec<TraverseStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{detail}")]
pub struct InvalidReference {
    pub detail: String,
}

impl InvalidReference {
    fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    pub fn to_diagnostic(&self, range: &SourceRange) -> Diagnostic {
        Diagnostic::error("Invalid reference", self.detail.clone()).with_subject(range)
    }
}

/// Interprets a traversal as a reference to a configuration object.
pub fn parse_ref(traversal: &Traversal, range: &SourceRange) -> Result<Reference, InvalidReference> {
    let steps = &traversal.steps;
    let reference = |subject: Referenceable, consumed: usize| Reference {
        subject,
        source_range: range.clone(),
        remaining: steps[consumed..].to_vec(),
    };

    match traversal.root.as_str() {
        "var" => Ok(reference(Referenceable::InputVariable(single_attr("var", steps)?), 1)),
        "local" => Ok(reference(Referenceable::LocalValue(single_attr("local", steps)?), 1)),
        "path" => Ok(reference(Referenceable::PathAttr(single_attr("path", steps)?), 1)),
        "terraform" => Ok(reference(
            Referenceable::TerraformAttr(single_attr("terraform", steps)?),
            1,
        )),
        "count" => Ok(reference(Referenceable::CountAttr(single_attr("count", steps)?), 1)),
        "each" => Ok(reference(Referenceable::ForEachAttr(single_attr("each", steps)?), 1)),
        "module" => {
            let Some(TraverseStep::Attr(name)) = steps.first() else {
                return Err(InvalidReference::new(
                    "The \"module\" object cannot be accessed directly. Instead, access one of its attributes.",
                ));
            };
            Ok(reference(Referenceable::ModuleCall(name.clone()), 1))
        }
        "data" => {
            let (Some(TraverseStep::Attr(ty)), Some(TraverseStep::Attr(name))) = (steps.first(), steps.get(1))
            else {
                return Err(InvalidReference::new(
                    "A reference to a data source must be followed by at least two attribute access operations, providing the data source type and name.",
                ));
            };
            Ok(resource_reference(Resource::data(ty, name), &steps[2..], range))
        }
        "self" => Err(InvalidReference::new(
            "The \"self\" object is not available in this context. This object can be used only in resource provisioner and connection blocks.",
        )),
        ty => {
            let Some(TraverseStep::Attr(name)) = steps.first() else {
                return Err(InvalidReference::new(
                    "A reference to a resource type must be followed by at least one attribute access, specifying the resource name.",
                ));
            };
            Ok(resource_reference(Resource::managed(ty, name), &steps[1..], range))
        }
    }
}

fn single_attr(root: &str, steps: &[TraverseStep]) -> Result<String, InvalidReference> {
    match steps.first() {
        Some(TraverseStep::Attr(name)) => Ok(name.clone()),
        Some(_) => Err(InvalidReference::new(format!(
            "The \"{root}\" object does not support this operation."
        ))),
        None => Err(InvalidReference::new(format!(
            "The \"{root}\" object cannot be accessed directly. Instead, access one of its attributes."
        ))),
    }
}

fn resource_reference(resource: Resource, rest: &[TraverseStep], range: &SourceRange) -> Reference {
    let key = match rest.first() {
        Some(TraverseStep::Index(Value::Number(n))) => n.as_i64().map(InstanceKey::Int),
        Some(TraverseStep::Index(Value::String(s))) => Some(InstanceKey::String(s.clone())),
        _ => None,
    };
    match key {
        Some(key) => Reference {
            subject: Referenceable::ResourceInstance(resource.instance(key)),
            source_range: range.clone(),
            remaining: rest[1..].to_vec(),
        },
        None => Reference {
            subject: Referenceable::Resource(resource),
            source_range: range.clone(),
            remaining: rest.to_vec(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str) -> TraverseStep {
        TraverseStep::Attr(name.to_string())
    }

    fn parse(root: &str, steps: Vec<TraverseStep>) -> Result<Reference, InvalidReference> {
        parse_ref(&Traversal::new(root, steps), &SourceRange::file_start("main.tf"))
    }

    #[test]
    fn namespaces() {
        let r = parse("var", vec![attr("region"), attr("name")]).unwrap();
        assert_eq!(r.subject, Referenceable::InputVariable("region".into()));
        assert_eq!(r.remaining, vec![attr("name")]);

        assert_eq!(
            parse("each", vec![attr("value")]).unwrap().subject.to_string(),
            "each.value"
        );
        assert_eq!(
            parse("module", vec![attr("net"), attr("id")]).unwrap().subject,
            Referenceable::ModuleCall("net".into())
        );
    }

    #[test]
    fn resources() {
        let r = parse("aws_instance", vec![attr("web"), TraverseStep::Index(Value::from(0)), attr("id")]).unwrap();
        assert_eq!(r.subject.to_string(), "aws_instance.web[0]");
        assert_eq!(r.remaining, vec![attr("id")]);

        let r = parse("data", vec![attr("aws_ami"), attr("ubuntu"), attr("id")]).unwrap();
        assert_eq!(r.subject.to_string(), "data.aws_ami.ubuntu");

        let r = parse("aws_instance", vec![attr("web"), TraverseStep::DynamicIndex]).unwrap();
        assert_eq!(r.subject, Referenceable::Resource(Resource::managed("aws_instance", "web")));
    }

    #[test]
    fn invalid() {
        assert!(parse("var", vec![]).is_err());
        assert!(parse("local", vec![TraverseStep::Index(Value::from(0))]).is_err());
        assert!(parse("self", vec![attr("id")]).is_err());
        assert!(parse("foo", vec![]).is_err());
        assert!(parse("data", vec![attr("aws_ami")]).is_err());
    }
}
