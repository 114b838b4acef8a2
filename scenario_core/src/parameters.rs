//! Parameter declarations and lexical scope resolution.
//!
//! A scenario declares typed parameters at several nesting levels
//! (storyboard, act, maneuver, ...). Attributes refer to them as `$name`.
//! Inner declarations shadow outer ones for as long as the inner element
//! lives, which maps directly onto a borrowed parent chain:
//!
//! ```text
//! Scope::root(storyboard)          { speed = 10.0 }
//!   └─ root.child(maneuver)        { speed = 25.0 }   <- "$speed" resolves here
//!        └─ ...
//! ```

use crate::error::{ConstructionError, Result, ScenarioError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    Integer,
    Double,
    String,
    UnsignedInt,
    UnsignedShort,
    Boolean,
    DateTime,
}

impl FromStr for ParameterType {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "integer" => Ok(ParameterType::Integer),
            "double" => Ok(ParameterType::Double),
            "string" => Ok(ParameterType::String),
            "unsignedInt" => Ok(ParameterType::UnsignedInt),
            "unsignedShort" => Ok(ParameterType::UnsignedShort),
            "boolean" => Ok(ParameterType::Boolean),
            "dateTime" => Ok(ParameterType::DateTime),
            _ => Err(ScenarioError::syntax(format!(
                "unexpected value '{}' specified as type ParameterType",
                s
            ))),
        }
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Integer(i64),
    Double(f64),
    String(String),
    UnsignedInt(u32),
    UnsignedShort(u16),
    Boolean(bool),
}

impl ParameterValue {
    /// Parse `text` as a value of `parameter_type`.
    ///
    /// # Errors
    /// * `Syntax` - the text is not a valid literal of the type
    /// * `UnsupportedFeature` - `dateTime` parameters
    pub fn parse(parameter_type: ParameterType, text: &str) -> Result<Self> {
        let invalid = || {
            ScenarioError::syntax(format!(
                "'{}' is not a valid {:?} literal",
                text, parameter_type
            ))
        };

        match parameter_type {
            ParameterType::Integer => text.parse().map(ParameterValue::Integer).map_err(|_| invalid()),
            ParameterType::Double => text.parse().map(ParameterValue::Double).map_err(|_| invalid()),
            ParameterType::String => Ok(ParameterValue::String(text.to_string())),
            ParameterType::UnsignedInt => text.parse().map(ParameterValue::UnsignedInt).map_err(|_| invalid()),
            ParameterType::UnsignedShort => text.parse().map(ParameterValue::UnsignedShort).map_err(|_| invalid()),
            ParameterType::Boolean => match text {
                "true" => Ok(ParameterValue::Boolean(true)),
                "false" => Ok(ParameterValue::Boolean(false)),
                _ => Err(invalid()),
            },
            ParameterType::DateTime => Err(ScenarioError::unsupported(format!(
                "parameter type dateTime (value '{}') is valid but not supported",
                text
            ))),
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Integer(v) => Some(*v as f64),
            ParameterValue::Double(v) => Some(*v),
            ParameterValue::UnsignedInt(v) => Some(f64::from(*v)),
            ParameterValue::UnsignedShort(v) => Some(f64::from(*v)),
            ParameterValue::String(_) | ParameterValue::Boolean(_) => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Integer(v) => write!(f, "{}", v),
            ParameterValue::Double(v) => write!(f, "{}", v),
            ParameterValue::String(v) => write!(f, "{}", v),
            ParameterValue::UnsignedInt(v) => write!(f, "{}", v),
            ParameterValue::UnsignedShort(v) => write!(f, "{}", v),
            ParameterValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

/// One `name = value` binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDeclaration {
    pub name: String,
    pub value: ParameterValue,
}

impl ParameterDeclaration {
    /// Build a declaration from its three string attributes.
    pub fn new(name: &str, parameter_type: &str, value: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(ScenarioError::syntax("parameter name must not be empty"));
        }
        if name.starts_with('$') {
            return Err(ScenarioError::syntax(format!(
                "parameter name '{}' must not start with '$'",
                name
            )));
        }
        let parameter_type: ParameterType = parameter_type.parse()?;
        Ok(Self {
            name: name.to_string(),
            value: ParameterValue::parse(parameter_type, value)?,
        })
    }
}

/// The ordered declarations attached to one syntax element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDeclarations {
    declarations: Vec<ParameterDeclaration>,
}

impl ParameterDeclarations {
    /// An empty declaration set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse zero or more `(name, type, value)` attribute triples.
    ///
    /// A name declared twice in the same set is rejected.
    pub fn parse<'a, I>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let mut declarations = Self::new();
        for (name, parameter_type, value) in raw {
            declarations.push(ParameterDeclaration::new(name, parameter_type, value)?)?;
        }
        Ok(declarations)
    }

    /// Append a declaration, rejecting duplicates.
    pub fn push(&mut self, declaration: ParameterDeclaration) -> Result<()> {
        if self.get(&declaration.name).is_some() {
            return Err(ConstructionError::DuplicateName {
                kind: "parameter",
                name: declaration.name,
            }
            .into());
        }
        self.declarations.push(declaration);
        Ok(())
    }

    /// Value bound to `name` in this set only.
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.declarations
            .iter()
            .find(|declaration| declaration.name == name)
            .map(|declaration| &declaration.value)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDeclaration> {
        self.declarations.iter()
    }
}

/// A lexical scope: local declarations plus a borrowed enclosing scope.
#[derive(Debug)]
pub struct Scope<'p> {
    declarations: ParameterDeclarations,
    parent: Option<&'p Scope<'p>>,
}

impl Scope<'static> {
    /// The outermost scope.
    pub fn root(declarations: ParameterDeclarations) -> Self {
        Self {
            declarations,
            parent: None,
        }
    }
}

impl<'p> Scope<'p> {
    /// Open a nested scope whose bindings shadow this one's.
    pub fn child(&self, declarations: ParameterDeclarations) -> Scope<'_> {
        Scope {
            declarations,
            parent: Some(self),
        }
    }

    /// Innermost binding of `name` (case-sensitive).
    pub fn lookup(&self, name: &str) -> Option<&ParameterValue> {
        self.declarations
            .get(name)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }

    /// Resolve a string attribute: `$name` is replaced by the parameter's
    /// text, anything else is returned verbatim.
    pub fn resolve(&self, attribute: &str) -> Result<String> {
        match attribute.strip_prefix('$') {
            Some(name) => self
                .lookup(name)
                .map(ToString::to_string)
                .ok_or_else(|| ScenarioError::lookup(format!("no parameter named '{}' in scope", name))),
            None => Ok(attribute.to_string()),
        }
    }

    /// Resolve an attribute and parse it as a floating point number.
    pub fn resolve_f64(&self, attribute: &str) -> Result<f64> {
        let text = self.resolve(attribute)?;
        text.parse()
            .map_err(|_| ScenarioError::syntax(format!("'{}' is not a number", text)))
    }

    /// Number of scopes from here to the root, inclusive.
    pub fn depth(&self) -> usize {
        1 + self.parent.map_or(0, |parent| parent.depth())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_typed_values() {
        let decls = ParameterDeclarations::parse([
            ("speed", "double", "12.5"),
            ("lanes", "unsignedShort", "3"),
            ("ego", "string", "vehicle"),
            ("enabled", "boolean", "true"),
        ])
        .unwrap();

        assert_eq!(decls.len(), 4);
        assert_eq!(decls.get("speed"), Some(&ParameterValue::Double(12.5)));
        assert_eq!(decls.get("lanes"), Some(&ParameterValue::UnsignedShort(3)));
        assert_eq!(decls.get("enabled"), Some(&ParameterValue::Boolean(true)));
    }

    #[test]
    fn test_empty_declarations() {
        let decls = ParameterDeclarations::parse(std::iter::empty()).unwrap();
        assert!(decls.is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = ParameterDeclarations::parse([("speed", "double", "1"), ("speed", "double", "2")])
            .unwrap_err();

        assert_eq!(
            err,
            ScenarioError::Construction(ConstructionError::DuplicateName {
                kind: "parameter",
                name: "speed".to_string(),
            })
        );
    }

    #[test]
    fn test_error_classes() {
        let bad_type = ParameterDeclaration::new("x", "float", "1.0").unwrap_err();
        assert_eq!(bad_type.kind(), ErrorKind::Syntax);

        let bad_value = ParameterDeclaration::new("x", "integer", "1.5").unwrap_err();
        assert_eq!(bad_value.kind(), ErrorKind::Syntax);

        let bad_name = ParameterDeclaration::new("$x", "integer", "1").unwrap_err();
        assert_eq!(bad_name.kind(), ErrorKind::Syntax);

        let date = ParameterDeclaration::new("start", "dateTime", "2020-01-01T00:00:00").unwrap_err();
        assert_eq!(date.kind(), ErrorKind::UnsupportedFeature);
    }

    #[test]
    fn test_shadowing_and_case_sensitivity() {
        let outer = Scope::root(
            ParameterDeclarations::parse([("speed", "double", "10"), ("owner", "string", "ego")]).unwrap(),
        );

        {
            let inner = outer.child(ParameterDeclarations::parse([("speed", "double", "25")]).unwrap());
            assert_eq!(inner.lookup("speed"), Some(&ParameterValue::Double(25.0)));
            assert_eq!(inner.lookup("owner"), Some(&ParameterValue::String("ego".to_string())));
            assert_eq!(inner.lookup("Speed"), None);
            assert_eq!(inner.depth(), 2);
        }

        // The shadow ends with the inner element
        assert_eq!(outer.lookup("speed"), Some(&ParameterValue::Double(10.0)));
    }

    #[test]
    fn test_resolve_attributes() {
        let scope = Scope::root(
            ParameterDeclarations::parse([("target", "string", "ARRIVED"), ("gap", "double", "7.5")]).unwrap(),
        );

        assert_eq!(scope.resolve("$target").unwrap(), "ARRIVED");
        assert_eq!(scope.resolve("literal").unwrap(), "literal");
        assert_eq!(scope.resolve_f64("$gap").unwrap(), 7.5);
        assert_eq!(scope.resolve("$missing").unwrap_err().kind(), ErrorKind::Lookup);
        assert_eq!(scope.resolve_f64("$target").unwrap_err().kind(), ErrorKind::Syntax);
    }
}
