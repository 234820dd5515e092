//! Resource graph: ordered declarations plus the edges implied by their
//! references.
//!
//! A declaration is either a managed resource or a lookup of something that
//! already exists. Edges come from `${name...}` interpolations anywhere in a
//! declaration's properties and from explicit `dependsOn` entries. The
//! provisioning engine walks the same edges; validation here catches the
//! mistakes it would only report mid-deployment.

use crate::roles::BuiltinRole;
use crate::types::{
    collect_references, interpolation_roots, LookupFunction, ProgramOptions, ResourceKind,
};
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::{algo, Direction};
use serde_json::{Map as JsonMap, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("'{0}' is declared more than once")]
    DuplicateName(String),

    #[error("'{from}' references undeclared '{to}'")]
    DanglingReference { from: String, to: String },

    #[error("'{from}' references '{to}', which is declared after it")]
    ForwardReference { from: String, to: String },

    #[error("dependency cycle through '{0}'")]
    Cycle(String),

    #[error("'{name}' has unknown type '{token}'")]
    UnknownType { name: String, token: String },

    #[error("'{name}' must take resourceGroupName from a declared resource group")]
    ResourceGroupNotDeclared { name: String },

    #[error("role assignment '{name}' must reference its {property}, not a literal")]
    LiteralRoleBinding { name: String, property: &'static str },

    #[error("role assignment '{name}' has unknown roleDefinitionId '{value}'")]
    UnknownRoleDefinition { name: String, value: String },
}

/// What a declaration asks the engine for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Managed resource by type token.
    Resource(String),
    /// Invoke of a provider function by token.
    Lookup(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub logical_name: String,
    pub target: Target,
    /// Physical name, when it differs from the logical one.
    pub name: Option<String>,
    /// Resource properties or lookup arguments.
    pub properties: JsonMap<String, Value>,
    pub options: ProgramOptions,
}

impl Declaration {
    pub fn resource(kind: ResourceKind, logical_name: impl Into<String>) -> Self {
        Self::new(logical_name, Target::Resource(kind.token().to_string()))
    }

    pub fn lookup(function: LookupFunction, logical_name: impl Into<String>) -> Self {
        Self::new(logical_name, Target::Lookup(function.token().to_string()))
    }

    pub fn new(logical_name: impl Into<String>, target: Target) -> Self {
        Self {
            logical_name: logical_name.into(),
            target,
            name: None,
            properties: JsonMap::new(),
            options: ProgramOptions::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn depends_on(mut self, logical_name: &str) -> Self {
        self.options.depends_on.push(logical_name.to_string());
        self
    }

    pub fn delete_before_replace(mut self) -> Self {
        self.options.delete_before_replace = true;
        self
    }

    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match &self.target {
            Target::Resource(token) => ResourceKind::from_token(token),
            Target::Lookup(_) => None,
        }
    }

    pub fn lookup_function(&self) -> Option<LookupFunction> {
        match &self.target {
            Target::Lookup(token) => LookupFunction::from_token(token),
            Target::Resource(_) => None,
        }
    }

    pub fn token(&self) -> &str {
        match &self.target {
            Target::Resource(token) | Target::Lookup(token) => token,
        }
    }

    /// Declarations this one depends on, first occurrence order, no duplicates.
    pub fn references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        for value in self.properties.values() {
            collect_references(value, &mut refs);
        }
        refs.extend(self.options.depends_on.iter().cloned());
        let mut seen = HashSet::new();
        refs.retain(|r| seen.insert(r.clone()));
        refs
    }

    fn is_resource_group_source(&self) -> bool {
        self.resource_kind() == Some(ResourceKind::ResourceGroup)
            || self.lookup_function() == Some(LookupFunction::ResourceGroup)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceGraph {
    declarations: Vec<Declaration>,
    outputs: IndexMap<String, Value>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a declaration and returns its logical name for later references.
    pub fn declare(&mut self, declaration: Declaration) -> String {
        let name = declaration.logical_name.clone();
        self.declarations.push(declaration);
        name
    }

    pub fn output(&mut self, key: &str, value: impl Into<Value>) {
        self.outputs.insert(key.to_string(), value.into());
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn outputs(&self) -> &IndexMap<String, Value> {
        &self.outputs
    }

    pub fn get(&self, logical_name: &str) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|d| d.logical_name == logical_name)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations
            .iter()
            .filter(|d| matches!(d.target, Target::Resource(_)))
    }

    pub fn lookups(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations
            .iter()
            .filter(|d| matches!(d.target, Target::Lookup(_)))
    }

    /// Checks every structural rule and returns all violations found.
    pub fn validate(&self) -> Result<(), Vec<GraphError>> {
        let mut errors = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (i, d) in self.declarations.iter().enumerate() {
            if positions.insert(d.logical_name.as_str(), i).is_some() {
                errors.push(GraphError::DuplicateName(d.logical_name.clone()));
            }
        }

        for (i, d) in self.declarations.iter().enumerate() {
            let known = match &d.target {
                Target::Resource(_) => d.resource_kind().is_some(),
                Target::Lookup(_) => d.lookup_function().is_some(),
            };
            if !known {
                errors.push(GraphError::UnknownType {
                    name: d.logical_name.clone(),
                    token: d.token().to_string(),
                });
            }

            for target in d.references() {
                match positions.get(target.as_str()) {
                    None => errors.push(GraphError::DanglingReference {
                        from: d.logical_name.clone(),
                        to: target,
                    }),
                    Some(&j) if j >= i => errors.push(GraphError::ForwardReference {
                        from: d.logical_name.clone(),
                        to: target,
                    }),
                    Some(_) => {}
                }
            }

            self.check_resource_group(d, &positions, &mut errors);
            if d.resource_kind() == Some(ResourceKind::RoleAssignment) {
                check_role_assignment(d, &mut errors);
            }
        }

        if let Err(cycle) = self.toposort() {
            errors.push(cycle);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check_resource_group(
        &self,
        d: &Declaration,
        positions: &HashMap<&str, usize>,
        errors: &mut Vec<GraphError>,
    ) {
        let Some(kind) = d.resource_kind() else {
            return;
        };
        if !kind.token().starts_with("azure-native:")
            || matches!(kind, ResourceKind::ResourceGroup | ResourceKind::RoleAssignment)
        {
            return;
        }
        let roots = d
            .properties
            .get("resourceGroupName")
            .and_then(Value::as_str)
            .map(interpolation_roots)
            .unwrap_or_default();
        let ok = match roots.as_slice() {
            [root] => match positions.get(root.as_str()) {
                Some(&j) => self.declarations[j].is_resource_group_source(),
                // Reported as a dangling reference already.
                None => true,
            },
            _ => false,
        };
        if !ok {
            errors.push(GraphError::ResourceGroupNotDeclared {
                name: d.logical_name.clone(),
            });
        }
    }

    /// Builds the dependency graph; edges point from a declaration to what it
    /// depends on. Dangling references produce no edge.
    fn dependency_graph(&self) -> (DiGraph<usize, ()>, Vec<NodeIndex>) {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..self.declarations.len())
            .map(|i| graph.add_node(i))
            .collect();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();
        for (i, d) in self.declarations.iter().enumerate() {
            index.entry(d.logical_name.as_str()).or_insert(nodes[i]);
        }
        for (i, d) in self.declarations.iter().enumerate() {
            for target in d.references() {
                if let Some(&to) = index.get(target.as_str()) {
                    graph.add_edge(nodes[i], to, ());
                }
            }
        }
        (graph, nodes)
    }

    fn toposort(&self) -> Result<Vec<usize>, GraphError> {
        let (graph, _) = self.dependency_graph();
        algo::toposort(&graph, None)
            .map(|sorted| sorted.into_iter().map(|n| graph[n]).collect())
            .map_err(|cycle| {
                GraphError::Cycle(self.declarations[graph[cycle.node_id()]].logical_name.clone())
            })
    }

    /// Groups declarations into levels whose members only depend on earlier
    /// levels. Members of a level keep declaration order.
    pub fn execution_levels(&self) -> Result<Vec<Vec<String>>, GraphError> {
        self.toposort()?;
        let (graph, nodes) = self.dependency_graph();

        let mut levels = Vec::new();
        let mut remaining: Vec<NodeIndex> = nodes;
        while !remaining.is_empty() {
            let pending: HashSet<NodeIndex> = remaining.iter().copied().collect();
            let (ready, blocked): (Vec<NodeIndex>, Vec<NodeIndex>) =
                remaining.into_iter().partition(|&n| {
                    !graph
                        .edges_directed(n, Direction::Outgoing)
                        .any(|e| e.target() != n && pending.contains(&e.target()))
                });
            if ready.is_empty() {
                // toposort rules this out; bail rather than loop.
                return Err(GraphError::Cycle(
                    self.declarations[graph[blocked[0]]].logical_name.clone(),
                ));
            }
            levels.push(
                ready
                    .iter()
                    .map(|&n| self.declarations[graph[n]].logical_name.clone())
                    .collect(),
            );
            remaining = blocked;
        }
        Ok(levels)
    }

    /// Declarations `logical_name` depends on.
    pub fn references_of(&self, logical_name: &str) -> Option<Vec<String>> {
        self.get(logical_name).map(Declaration::references)
    }

    /// Declarations that depend on `logical_name`.
    pub fn dependents_of(&self, logical_name: &str) -> Option<Vec<String>> {
        self.get(logical_name)?;
        Some(
            self.declarations
                .iter()
                .filter(|d| d.references().iter().any(|r| r == logical_name))
                .map(|d| d.logical_name.clone())
                .collect(),
        )
    }
}

fn check_role_assignment(d: &Declaration, errors: &mut Vec<GraphError>) {
    for property in ["principalId", "scope"] {
        let is_reference = d
            .properties
            .get(property)
            .and_then(Value::as_str)
            .map(|s| !interpolation_roots(s).is_empty())
            .unwrap_or(false);
        if !is_reference {
            errors.push(GraphError::LiteralRoleBinding {
                name: d.logical_name.clone(),
                property,
            });
        }
    }
    let role = d
        .properties
        .get("roleDefinitionId")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if BuiltinRole::from_definition_id(role).is_none() {
        errors.push(GraphError::UnknownRoleDefinition {
            name: d.logical_name.clone(),
            value: role.to_string(),
        });
    }
}
