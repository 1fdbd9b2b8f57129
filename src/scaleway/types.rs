//! Newtypes for Scaleway lifecycle values to avoid stringly-typed code.

use std::ops::Deref;

use crate::backend::InstanceState;

macro_rules! newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub(crate) struct $name(String);

        impl $name {
            pub(crate) const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }
    };
}

newtype!(Zone);
newtype!(ServerState);
newtype!(Action);

impl ServerState {
    /// Maps the Scaleway server state onto the provider-neutral state.
    pub(crate) fn to_instance_state(&self) -> InstanceState {
        match self.as_str() {
            "starting" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "stopping" => InstanceState::Stopping,
            "stopped" | "stopped in place" => InstanceState::Stopped,
            _ => InstanceState::Unknown,
        }
    }
}
