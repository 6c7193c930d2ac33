use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a string-valued enum. Values outside the listed ones decode into
/// `Other` rather than failing.
macro_rules! open_string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )*
            /// A value this controller does not know, kept as written.
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $( $name::$variant => $wire, )*
                    $name::Other(raw) => raw.as_str(),
                }
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                match raw.as_str() {
                    $( $wire => $name::$variant, )*
                    _ => $name::Other(raw),
                }
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                match value {
                    $name::Other(raw) => raw,
                    known => known.as_str().to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl JsonSchema for $name {
            fn schema_name() -> String {
                stringify!($name).to_string()
            }

            fn json_schema(gen: &mut SchemaGenerator) -> Schema {
                String::json_schema(gen)
            }

            fn is_referenceable() -> bool {
                false
            }
        }
    };
}

// ---------------------------------------------------------------------------
// ActivityStatus
// ---------------------------------------------------------------------------

open_string_enum! {
    /// Status of a pipeline activity, or of one of its steps.
    ///
    /// The empty string on the wire means the step has not started yet.
    pub enum ActivityStatus {
        #[default]
        None => "",
        Pending => "Pending",
        Running => "Running",
        Succeeded => "Succeeded",
        Failed => "Failed",
        WaitingForApproval => "WaitingForApproval",
        Error => "Error",
        Aborted => "Aborted",
    }
}

impl ActivityStatus {
    /// True once the activity has stopped executing. Unknown values are
    /// treated as still running.
    pub fn is_terminated(&self) -> bool {
        matches!(
            self,
            ActivityStatus::Succeeded
                | ActivityStatus::Failed
                | ActivityStatus::Error
                | ActivityStatus::Aborted
        )
    }
}

// ---------------------------------------------------------------------------
// PromotionStrategy
// ---------------------------------------------------------------------------

open_string_enum! {
    pub enum PromotionStrategy {
        #[default]
        Unset => "",
        Automatic => "Auto",
        Manual => "Manual",
        Never => "Never",
    }
}

// ---------------------------------------------------------------------------
// EnvironmentKind
// ---------------------------------------------------------------------------

open_string_enum! {
    pub enum EnvironmentKind {
        #[default]
        Unset => "",
        Permanent => "Permanent",
        Preview => "Preview",
        Test => "Test",
        Edit => "Edit",
        Development => "Development",
    }
}

impl EnvironmentKind {
    /// Anything that is not a short-lived preview, test or edit environment.
    pub fn is_permanent(&self) -> bool {
        !matches!(
            self,
            EnvironmentKind::Preview | EnvironmentKind::Test | EnvironmentKind::Edit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(ActivityStatus::Succeeded.is_terminated());
        assert!(ActivityStatus::Failed.is_terminated());
        assert!(ActivityStatus::Error.is_terminated());
        assert!(ActivityStatus::Aborted.is_terminated());
        assert!(!ActivityStatus::None.is_terminated());
        assert!(!ActivityStatus::Pending.is_terminated());
        assert!(!ActivityStatus::Running.is_terminated());
        assert!(!ActivityStatus::WaitingForApproval.is_terminated());
    }

    #[test]
    fn empty_status_deserializes_to_none() {
        let s: ActivityStatus = serde_json::from_str(r#""""#).unwrap();
        assert_eq!(s, ActivityStatus::None);
        let s: ActivityStatus = serde_json::from_str(r#""Succeeded""#).unwrap();
        assert_eq!(s, ActivityStatus::Succeeded);
    }

    #[test]
    fn automatic_strategy_uses_auto_on_the_wire() {
        let s: PromotionStrategy = serde_json::from_str(r#""Auto""#).unwrap();
        assert_eq!(s, PromotionStrategy::Automatic);
        assert_eq!(
            serde_json::to_string(&PromotionStrategy::Automatic).unwrap(),
            r#""Auto""#
        );
    }

    #[test]
    fn unknown_values_are_kept_not_rejected() {
        let s: ActivityStatus = serde_json::from_str(r#""NotExecuted""#).unwrap();
        assert_eq!(s, ActivityStatus::Other("NotExecuted".to_string()));
        assert!(!s.is_terminated());
        assert_eq!(serde_json::to_string(&s).unwrap(), r#""NotExecuted""#);

        let p: PromotionStrategy = serde_json::from_str(r#""Canary""#).unwrap();
        assert_eq!(p.as_str(), "Canary");
        let k: EnvironmentKind = serde_json::from_str(r#""Sandbox""#).unwrap();
        assert!(k.is_permanent());
    }

    #[test]
    fn known_values_round_trip_by_name() {
        assert_eq!(
            serde_json::to_string(&ActivityStatus::None).unwrap(),
            r#""""#
        );
        let k: EnvironmentKind = serde_json::from_str(r#""Preview""#).unwrap();
        assert_eq!(k, EnvironmentKind::Preview);
    }

    #[test]
    fn permanent_kinds() {
        assert!(EnvironmentKind::Unset.is_permanent());
        assert!(EnvironmentKind::Permanent.is_permanent());
        assert!(EnvironmentKind::Development.is_permanent());
        assert!(!EnvironmentKind::Preview.is_permanent());
        assert!(!EnvironmentKind::Edit.is_permanent());
    }
}
