//! Validation pipeline implementation.

use crate::core::error::{NodeId, ValidationError, ValidationReport};
use crate::graph::structure::PipelineGraph;
use crate::validation::stages::{ConstraintValidation, StructuralValidation, ValidationStage};
use std::time::Instant;

/// Multi-stage validation pipeline.
///
/// Runs each stage over the nodes of one update and collects their errors
/// and warnings into a single report.
pub struct ValidationPipeline {
    stages: Vec<Box<dyn ValidationStage>>,
}

impl ValidationPipeline {
    pub fn new(stages: Vec<Box<dyn ValidationStage>>) -> Self {
        Self { stages }
    }

    /// Structural checks followed by parameter constraints.
    pub fn default_pipeline() -> Self {
        Self {
            stages: vec![Box::new(StructuralValidation), Box::new(ConstraintValidation)],
        }
    }

    pub fn add_stage(&mut self, stage: Box<dyn ValidationStage>) {
        self.stages.push(stage);
    }

    /// Validate `scope` through all stages, stopping at the first fatal error.
    pub fn validate(&self, graph: &PipelineGraph, scope: &[NodeId]) -> ValidationReport {
        let start = Instant::now();
        let mut report = ValidationReport::default();

        for stage in &self.stages {
            match stage.validate(graph, scope) {
                Ok(warnings) => {
                    for warning in &warnings {
                        log::debug!("{}: {}", stage.name(), warning.message);
                    }
                    report.warnings.extend(warnings);
                }
                Err(errors) => {
                    let fatal = errors.iter().any(ValidationError::is_fatal);
                    report.errors.extend(errors);
                    if fatal {
                        break;
                    }
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::default_pipeline()
    }
}
