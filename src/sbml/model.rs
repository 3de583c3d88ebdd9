//! In-memory model representation
//!
//! The entity table a document parser produces: compartments, species,
//! parameters, reactions and function definitions, keyed by id, plus the
//! rule list in document order. Kinetic-law-local parameters arrive rescoped
//! to `"<reaction>:<name>"` ids with their origin recorded in `scope`.
//!
//! # Example
//!
//! ```
//! use sbmlfort::sbml::{Model, Compartment, Species};
//!
//! let mut model = Model::new("example");
//! model.compartments.push(Compartment::new("cell").with_size(1.0));
//! model.species.push(Species::new("S", "cell").with_concentration(0.5));
//! assert!(model.has_entity("S"));
//! ```

use serde::{Deserialize, Serialize};

use super::ast::Expr;
use crate::error::CompilerError;

fn default_true() -> bool {
    true
}

/// A reaction vessel with a (possibly dynamic) volume
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Compartment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outside: Option<String>,
    #[serde(default = "default_true")]
    pub constant: bool,
}

impl Compartment {
    pub fn new(id: impl Into<String>) -> Self {
        Compartment {
            id: id.into(),
            name: None,
            size: None,
            outside: None,
            constant: true,
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }
}

/// A chemical species living in a compartment
///
/// A species is amount-defined iff `initial_amount` is set; otherwise its
/// generated state variable carries a concentration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Species {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub compartment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_concentration: Option<f64>,
    #[serde(default)]
    pub constant: bool,
    #[serde(default)]
    pub boundary_condition: bool,
}

impl Species {
    pub fn new(id: impl Into<String>, compartment: impl Into<String>) -> Self {
        Species {
            id: id.into(),
            name: None,
            compartment: compartment.into(),
            initial_amount: None,
            initial_concentration: None,
            constant: false,
            boundary_condition: false,
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.initial_amount = Some(amount);
        self
    }

    pub fn with_concentration(mut self, conc: f64) -> Self {
        self.initial_concentration = Some(conc);
        self
    }

    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }
}

/// A scalar model quantity
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Parameter {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default = "default_true")]
    pub constant: bool,
    /// Reaction this parameter was local to before the parser rescoped it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Parameter {
    pub fn new(id: impl Into<String>) -> Self {
        Parameter {
            id: id.into(),
            name: None,
            value: None,
            constant: true,
            scope: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn volatile(mut self) -> Self {
        self.constant = false;
        self
    }

    pub fn scoped_to(mut self, reaction: impl Into<String>) -> Self {
        self.scope = Some(reaction.into());
        self
    }
}

/// Role of a species within a reaction
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Reactant,
    Product,
    Modifier,
}

/// Stoichiometric factor of a species reference
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Stoichiometry {
    Int(i64),
    Math(Expr),
}

impl Default for Stoichiometry {
    fn default() -> Self {
        Stoichiometry::Int(1)
    }
}

/// Participation of one species in a reaction
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpeciesReference {
    pub species: String,
    pub role: Role,
    #[serde(default)]
    pub stoichiometry: Stoichiometry,
}

impl SpeciesReference {
    pub fn reactant(species: impl Into<String>) -> Self {
        SpeciesReference {
            species: species.into(),
            role: Role::Reactant,
            stoichiometry: Stoichiometry::default(),
        }
    }

    pub fn product(species: impl Into<String>) -> Self {
        SpeciesReference {
            species: species.into(),
            role: Role::Product,
            stoichiometry: Stoichiometry::default(),
        }
    }

    pub fn modifier(species: impl Into<String>) -> Self {
        SpeciesReference {
            species: species.into(),
            role: Role::Modifier,
            stoichiometry: Stoichiometry::default(),
        }
    }

    pub fn times(mut self, n: i64) -> Self {
        self.stoichiometry = Stoichiometry::Int(n);
        self
    }
}

/// A reaction with its kinetic law
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Reaction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub reversible: bool,
    pub kinetic_law: Expr,
    #[serde(default)]
    pub species: Vec<SpeciesReference>,
}

impl Reaction {
    pub fn new(id: impl Into<String>, kinetic_law: Expr) -> Self {
        Reaction {
            id: id.into(),
            name: None,
            reversible: true,
            kinetic_law,
            species: Vec::new(),
        }
    }

    pub fn with(mut self, sref: SpeciesReference) -> Self {
        self.species.push(sref);
        self
    }
}

/// A user-defined function
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Function {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub args: Vec<String>,
    pub body: Expr,
}

impl Function {
    pub fn new(id: impl Into<String>, args: Vec<&str>, body: Expr) -> Self {
        Function {
            id: id.into(),
            name: None,
            args: args.iter().map(|a| a.to_string()).collect(),
            body,
        }
    }
}

/// Kind of a rule
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Assignment,
    Rate,
    Algebraic,
}

/// An explicit equation of the model
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Rule {
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    pub math: Expr,
}

impl Rule {
    pub fn assignment(variable: impl Into<String>, math: Expr) -> Self {
        Rule {
            kind: RuleKind::Assignment,
            variable: Some(variable.into()),
            math,
        }
    }

    pub fn rate(variable: impl Into<String>, math: Expr) -> Self {
        Rule {
            kind: RuleKind::Rate,
            variable: Some(variable.into()),
            math,
        }
    }

    pub fn algebraic(math: Expr) -> Self {
        Rule {
            kind: RuleKind::Algebraic,
            variable: None,
            math,
        }
    }
}

/// The entity table of one model document
///
/// Entity lists keep document order; the construction scan and the generated
/// code depend on it.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Model {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub compartments: Vec<Compartment>,
    #[serde(default)]
    pub species: Vec<Species>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Model {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Parse a model from its JSON document form
    pub fn from_json(json: &str) -> Result<Self, CompilerError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn compartment(&self, id: &str) -> Option<&Compartment> {
        self.compartments.iter().find(|c| c.id == id)
    }

    pub fn get_species(&self, id: &str) -> Option<&Species> {
        self.species.iter().find(|s| s.id == id)
    }

    pub fn parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    pub fn reaction(&self, id: &str) -> Option<&Reaction> {
        self.reactions.iter().find(|r| r.id == id)
    }

    pub fn function(&self, id: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == id)
    }

    /// Whether any entity carries this id
    pub fn has_entity(&self, id: &str) -> bool {
        self.compartment(id).is_some()
            || self.get_species(id).is_some()
            || self.parameter(id).is_some()
            || self.reaction(id).is_some()
            || self.function(id).is_some()
    }

    /// Resolve a display name to an entity id
    pub fn id_from_name(&self, name: &str) -> Option<&str> {
        let hit = |n: &Option<String>| n.as_deref() == Some(name);
        self.compartments
            .iter()
            .find(|c| hit(&c.name))
            .map(|c| c.id.as_str())
            .or_else(|| {
                self.species
                    .iter()
                    .find(|s| hit(&s.name))
                    .map(|s| s.id.as_str())
            })
            .or_else(|| {
                self.parameters
                    .iter()
                    .find(|p| hit(&p.name))
                    .map(|p| p.id.as_str())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbml::ast::Expr;

    fn two_species_model() -> Model {
        let mut model = Model::new("dimerization");
        model.compartments.push(Compartment::new("cell").with_size(1.0));
        model.species.push(Species::new("A", "cell").with_amount(10.0));
        model.species.push(Species::new("B", "cell").with_concentration(0.0));
        model.parameters.push(Parameter::new("k").with_value(0.3));
        model.reactions.push(
            Reaction::new("R1", Expr::mul(Expr::name("k"), Expr::name("A")))
                .with(SpeciesReference::reactant("A").times(2))
                .with(SpeciesReference::product("B")),
        );
        model
    }

    #[test]
    fn test_entity_lookup() {
        let model = two_species_model();
        assert!(model.has_entity("A"));
        assert!(model.has_entity("R1"));
        assert!(!model.has_entity("C"));
        assert_eq!(model.get_species("A").unwrap().initial_amount, Some(10.0));
        assert!(model.get_species("B").unwrap().initial_amount.is_none());
    }

    #[test]
    fn test_name_resolution() {
        let mut model = two_species_model();
        model.species[0].name = Some("dimer precursor".to_string());
        assert_eq!(model.id_from_name("dimer precursor"), Some("A"));
        assert_eq!(model.id_from_name("unknown"), None);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "name": "minimal",
            "compartments": [{ "id": "cell", "size": 1.0 }],
            "species": [{ "id": "S", "compartment": "cell", "initial_amount": 2.0 }],
            "rules": [{ "kind": "Rate", "variable": "S", "math": { "Num": -1.0 } }]
        }"#;
        let model = Model::from_json(json).unwrap();
        assert_eq!(model.name.as_deref(), Some("minimal"));
        assert!(model.compartment("cell").unwrap().constant);
        assert_eq!(model.rules.len(), 1);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = Model::from_json("{ not json").unwrap_err();
        assert!(matches!(
            err,
            crate::error::CompilerError::UnreadableInput(_)
        ));
    }
}
