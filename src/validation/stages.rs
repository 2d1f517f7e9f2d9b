//! Individual validation stages.
//!
//! Each stage checks one category of problem over the nodes an update is
//! about to plan.

use crate::core::error::{NodeId, ValidationError, ValidationWarning};
use crate::graph::structure::PipelineGraph;
use crate::graph::topology::TopologyAnalyzer;
use std::collections::HashSet;

/// Trait for validation stages.
pub trait ValidationStage: Send + Sync {
    fn name(&self) -> &str;

    /// Validate the nodes in `scope`.
    ///
    /// Returns Ok with warnings, or Err with errors.
    fn validate(
        &self,
        graph: &PipelineGraph,
        scope: &[NodeId],
    ) -> Result<Vec<ValidationWarning>, Vec<ValidationError>>;
}

/// Structural validation.
///
/// Verifies:
/// - The graph is a DAG
/// - Every required input in scope is connected
///
/// Warns about outputs nothing in scope consumes.
pub struct StructuralValidation;

impl ValidationStage for StructuralValidation {
    fn name(&self) -> &str {
        "Structural Validation"
    }

    fn validate(
        &self,
        graph: &PipelineGraph,
        scope: &[NodeId],
    ) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if TopologyAnalyzer::new(graph).has_cycle() {
            return Err(vec![ValidationError::CycleDetected]);
        }

        let in_scope: HashSet<NodeId> = scope.iter().copied().collect();
        let terminal = scope.last().copied();

        for &node_id in scope {
            let Ok(node) = graph.get_node(node_id) else {
                errors.push(ValidationError::Other(format!("Node {} not found", node_id)));
                continue;
            };

            for input in &node.metadata().inputs {
                if !input.optional && graph.input_connection(node_id, &input.name).is_none() {
                    errors.push(ValidationError::MissingRequiredInput {
                        node_id,
                        port: input.name.clone(),
                    });
                }
            }

            if Some(node_id) == terminal {
                continue;
            }
            for output in &node.metadata().outputs {
                let consumed = graph
                    .connections_from(node_id)
                    .any(|c| c.from.port_name == output.name && in_scope.contains(&c.to.node_id));
                if !consumed {
                    warnings.push(ValidationWarning {
                        message: format!(
                            "Output '{}' of '{}' is not consumed by this update",
                            output.name,
                            node.display_name()
                        ),
                        node_id: Some(node_id),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors)
        }
    }
}

/// Constraint validation.
///
/// Verifies every parameter value matches its declared type and constraints.
pub struct ConstraintValidation;

impl ValidationStage for ConstraintValidation {
    fn name(&self) -> &str {
        "Constraint Validation"
    }

    fn validate(
        &self,
        graph: &PipelineGraph,
        scope: &[NodeId],
    ) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        let mut errors = Vec::new();

        for node in scope.iter().filter_map(|&id| graph.get_node(id).ok()) {
            for param_def in &node.metadata().parameters {
                let value = node
                    .get_parameter(&param_def.name)
                    .unwrap_or(&param_def.default_value);
                if let Err(error) = param_def.check(value) {
                    errors.push(ValidationError::ConstraintViolation {
                        node_id: node.id,
                        parameter: param_def.name.clone(),
                        error,
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(Vec::new())
        } else {
            Err(errors)
        }
    }
}
