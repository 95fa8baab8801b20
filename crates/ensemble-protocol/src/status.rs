//! Outcome codes carried in responses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of processing one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failure,
    BadIndex,
    BadObjectType,
    BadRequest,
    BadUri,
    BadValueType,
    BadValue,
    ClientNotFound,
    CreationFailed,
    DirectionMismatch,
    Exists,
    InternalError,
    InvalidParent,
    InvalidPoly,
    NotDeletable,
    NotFound,
    NotMovable,
    NotPrepared,
    NoSpace,
    ParentDiffers,
    ParentNotFound,
    PrototypeNotFound,
    PortNotFound,
    TypeMismatch,
    UnknownType,
}

impl Status {
    #[inline]
    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Status::Success => "Success",
            Status::Failure => "Failure",
            Status::BadIndex => "Invalid index",
            Status::BadObjectType => "Invalid object type",
            Status::BadRequest => "Invalid request",
            Status::BadUri => "Invalid URI",
            Status::BadValueType => "Invalid value type",
            Status::BadValue => "Invalid value",
            Status::ClientNotFound => "Client not found",
            Status::CreationFailed => "Creation failed",
            Status::DirectionMismatch => "Direction mismatch",
            Status::Exists => "Object exists",
            Status::InternalError => "Internal error",
            Status::InvalidParent => "Invalid parent",
            Status::InvalidPoly => "Invalid polyphony",
            Status::NotDeletable => "Object not deletable",
            Status::NotFound => "Object not found",
            Status::NotMovable => "Object not movable",
            Status::NotPrepared => "Not prepared",
            Status::NoSpace => "Insufficient space",
            Status::ParentDiffers => "Parent differs",
            Status::ParentNotFound => "Parent not found",
            Status::PrototypeNotFound => "Prototype not found",
            Status::PortNotFound => "Port not found",
            Status::TypeMismatch => "Type mismatch",
            Status::UnknownType => "Unknown type",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
