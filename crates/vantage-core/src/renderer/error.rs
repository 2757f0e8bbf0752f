// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the hierarchy of error types for the rendering subsystem.
//!
//! Resource-creation failures are recoverable: the stage that hit them degrades
//! its feature. Shader and pipeline failures during initialization are fatal to
//! the stage and reach the host through [`InitStatus`] and [`RenderError`].

use crate::renderer::api::pipeline::RenderPipelineId;
use crate::renderer::api::shader::ShaderProgramId;
use std::fmt;

/// An error related to the compilation or lookup of a shader program.
#[derive(Debug)]
pub enum ShaderError {
    /// The shader variant failed to compile or validate.
    CompilationError {
        /// The variant, rendered as `stages -Ddefines`.
        label: String,
        /// Detailed error messages from the shader compiler.
        details: String,
    },
    /// The requested shader program could not be found.
    NotFound {
        /// The ID of the shader program that was not found.
        id: ShaderProgramId,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::CompilationError { label, details } => {
                write!(f, "Shader compilation failed for '{label}': {details}")
            }
            ShaderError::NotFound { id } => {
                write!(f, "Shader program not found for ID: {id:?}")
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// An error related to the creation or management of a graphics pipeline.
#[derive(Debug)]
pub enum PipelineError {
    /// The graphics backend failed to compile the full pipeline state object.
    CompilationFailed {
        /// A descriptive label for the pipeline, if available.
        label: Option<String>,
        /// Detailed error messages from the backend.
        details: String,
    },
    /// The program referenced by the pipeline is invalid or was destroyed.
    InvalidProgram {
        /// The ID of the invalid program.
        id: ShaderProgramId,
        /// The label of the pipeline being created.
        pipeline_label: Option<String>,
    },
    /// The specified render pipeline ID is not valid.
    InvalidRenderPipeline {
        /// The ID of the invalid render pipeline.
        id: RenderPipelineId,
    },
    /// A required graphics feature is not supported by the device.
    FeatureNotSupported(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::CompilationFailed { label, details } => {
                write!(
                    f,
                    "Pipeline compilation failed for '{}': {}",
                    label.as_deref().unwrap_or("Unknown"),
                    details
                )
            }
            PipelineError::InvalidProgram { id, pipeline_label } => {
                write!(
                    f,
                    "Invalid shader program {:?} for pipeline '{}'",
                    id,
                    pipeline_label.as_deref().unwrap_or("Unknown")
                )
            }
            PipelineError::InvalidRenderPipeline { id } => {
                write!(f, "Invalid render pipeline ID: {id:?}")
            }
            PipelineError::FeatureNotSupported(msg) => {
                write!(f, "Feature not supported: {msg}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug)]
pub enum ResourceError {
    /// A shader-specific error occurred.
    Shader(ShaderError),
    /// A pipeline-specific error occurred.
    Pipeline(PipelineError),
    /// A generic resource could not be found.
    NotFound,
    /// The handle or ID used to reference a resource is invalid.
    InvalidHandle,
    /// The backend refused to allocate the resource (unsupported format or size).
    AllocationFailed {
        /// Label of the resource.
        label: String,
        /// Backend message.
        reason: String,
    },
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
    /// An attempt was made to access a resource out of its bounds.
    OutOfBounds,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Shader(err) => write!(f, "Shader resource error: {err}"),
            ResourceError::Pipeline(err) => write!(f, "Pipeline resource error: {err}"),
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::AllocationFailed { label, reason } => {
                write!(f, "Failed to allocate '{label}': {reason}")
            }
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
            ResourceError::OutOfBounds => {
                write!(f, "Resource access out of bounds.")
            }
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Shader(err) => Some(err),
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        ResourceError::Shader(err)
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// A high-level error surfaced by the frame orchestrator.
#[derive(Debug)]
pub enum RenderError {
    /// An operation was attempted before the orchestrator was initialized.
    NotInitialized,
    /// A stage failed to initialize. The benchmark should not start.
    InitializationFailed {
        /// Name of the stage.
        stage: String,
        /// The failure.
        source: ResourceError,
    },
    /// A critical, unrecoverable rendering operation failed.
    RenderingFailed(String),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// An unexpected or internal error occurred.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NotInitialized => {
                write!(f, "The renderer is not initialized.")
            }
            RenderError::InitializationFailed { stage, source } => {
                write!(f, "Stage '{stage}' failed to initialize: {source}")
            }
            RenderError::RenderingFailed(msg) => {
                write!(f, "A critical rendering operation failed: {msg}")
            }
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            RenderError::InitializationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

/// Result of initializing one stage.
#[derive(Debug)]
pub enum InitStatus {
    /// The stage is ready to record.
    Ready,
    /// The stage could not build its programs or pipelines.
    Failed {
        /// Name of the stage.
        stage: String,
        /// The failure.
        error: ResourceError,
    },
}

impl InitStatus {
    /// Returns `true` for [`InitStatus::Ready`].
    pub fn is_ready(&self) -> bool {
        matches!(self, InitStatus::Ready)
    }

    /// Converts a failed status into a [`RenderError`].
    pub fn into_result(self) -> Result<(), RenderError> {
        match self {
            InitStatus::Ready => Ok(()),
            InitStatus::Failed { stage, error } => Err(RenderError::InitializationFailed {
                stage,
                source: error,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn shader_error_display() {
        let err = ShaderError::CompilationError {
            label: "gbuffer.vert+gbuffer.frag -DSKELETAL".to_string(),
            details: "undeclared identifier 'bones' at line 41".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Shader compilation failed for 'gbuffer.vert+gbuffer.frag -DSKELETAL': undeclared identifier 'bones' at line 41"
        );
    }

    #[test]
    fn resource_error_display_wrapping_shader_error() {
        let shader_err = ShaderError::NotFound {
            id: ShaderProgramId(42),
        };
        let res_err: ResourceError = shader_err.into();
        assert_eq!(
            format!("{res_err}"),
            "Shader resource error: Shader program not found for ID: ShaderProgramId(42)"
        );
        assert!(res_err.source().is_some());
    }

    #[test]
    fn init_status_into_render_error() {
        let status = InitStatus::Failed {
            stage: "GBufferLane".to_string(),
            error: ShaderError::NotFound {
                id: ShaderProgramId(7),
            }
            .into(),
        };
        assert!(!status.is_ready());
        let err = status.into_result().unwrap_err();
        assert_eq!(
            format!("{err}"),
            "Stage 'GBufferLane' failed to initialize: Shader resource error: Shader program not found for ID: ShaderProgramId(7)"
        );
        assert!(err.source().unwrap().source().is_some());
        assert!(InitStatus::Ready.into_result().is_ok());
    }
}
