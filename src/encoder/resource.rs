//! Resource attributes supplied by the host application

use crate::model::{AttributeValue, Attributes};

/// Identity of the process, device and user emitting telemetry.
///
/// Every field is optional; absent fields are left out of the envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceAttributes {
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    pub device_id: Option<String>,
    pub device_model: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub environment: Option<String>,
    /// Anything without a dedicated field
    pub extra: Attributes,
}

impl ResourceAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self.service_version = Some(version.into());
        self
    }

    pub fn device(mut self, id: impl Into<String>, model: impl Into<String>) -> Self {
        self.device_id = Some(id.into());
        self.device_model = Some(model.into());
        self
    }

    pub fn os(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.os_name = Some(name.into());
        self.os_version = Some(version.into());
        self
    }

    pub fn session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn user(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn project(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.environment = Some(env.into());
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Flatten into semantic-convention keys. Dedicated fields win over `extra`.
    pub fn to_attributes(&self) -> Attributes {
        let mut attributes = self.extra.clone();
        let fields = [
            ("service.name", &self.service_name),
            ("service.version", &self.service_version),
            ("device.id", &self.device_id),
            ("device.model.identifier", &self.device_model),
            ("os.name", &self.os_name),
            ("os.version", &self.os_version),
            ("session.id", &self.session_id),
            ("user.id", &self.user_id),
            ("project.id", &self.project_id),
            ("deployment.environment", &self.environment),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                attributes.insert(key.to_string(), AttributeValue::String(value.clone()));
            }
        }
        attributes
    }
}

/// Supplies resource attributes once per pipeline lifetime
pub trait ContextProvider: Send + Sync {
    fn resource_attributes(&self) -> ResourceAttributes;
}

impl ContextProvider for ResourceAttributes {
    fn resource_attributes(&self) -> ResourceAttributes {
        self.clone()
    }
}
