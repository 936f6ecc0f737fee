use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::{Coordinates, MediaRef};

/// Permissioned device features the chat composer can attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceFeature {
    MediaLibrary,
    Location,
}

impl DeviceFeature {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MediaLibrary => "Photo library access is required.",
            Self::Location => "Location access is required.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceOperation {
    PickImage,
    CurrentLocation,
}

impl Operation for DeviceOperation {
    type Output = DeviceResult;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceOutput {
    ImagePicked { uri: String },
    PickCancelled,
    Location { lat: f64, lon: f64 },
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceError {
    #[error("permission denied: {feature:?}")]
    PermissionDenied { feature: DeviceFeature },

    #[error("device feature unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("unexpected device output")]
    UnexpectedOutput,
}

pub type DeviceResult = Result<DeviceOutput, DeviceError>;

#[derive(Capability)]
pub struct Device<Ev> {
    context: CapabilityContext<DeviceOperation, Ev>,
}

impl<Ev> Device<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<DeviceOperation, Ev>) -> Self {
        Self { context }
    }

    /// Resolves to `Ok(None)` when the user dismisses the picker.
    pub fn pick_image<F>(&self, make_event: F)
    where
        F: FnOnce(Result<Option<MediaRef>, DeviceError>) -> Ev + Send + 'static,
        Ev: Send,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = match ctx.request_from_shell(DeviceOperation::PickImage).await {
                Ok(DeviceOutput::ImagePicked { uri }) => MediaRef::new(uri)
                    .map(Some)
                    .ok_or_else(|| DeviceError::Unavailable {
                        reason: "picker returned an empty uri".to_string(),
                    }),
                Ok(DeviceOutput::PickCancelled) => Ok(None),
                Ok(DeviceOutput::Location { .. }) => Err(DeviceError::UnexpectedOutput),
                Err(e) => Err(e),
            };
            ctx.update_app(make_event(result));
        });
    }

    pub fn current_location<F>(&self, make_event: F)
    where
        F: FnOnce(Result<Coordinates, DeviceError>) -> Ev + Send + 'static,
        Ev: Send,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = match ctx.request_from_shell(DeviceOperation::CurrentLocation).await {
                Ok(DeviceOutput::Location { lat, lon }) => {
                    Coordinates::new(lat, lon).map_err(|e| DeviceError::Unavailable {
                        reason: e.to_string(),
                    })
                }
                Ok(_) => Err(DeviceError::UnexpectedOutput),
                Err(e) => Err(e),
            };
            ctx.update_app(make_event(result));
        });
    }
}
