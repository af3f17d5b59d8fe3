/// Configuration macros for zero-repetition config definitions

/// Define a configuration struct with embedded defaults
///
/// Generates the struct with public fields, a `Default` impl built from the
/// inline values, and serde support with `#[serde(default)]` so partial TOML
/// files fill in the rest.
///
/// ```ignore
/// config_struct! {
///     pub struct RiskConfig {
///         max_trade_size_usd: f64 = 100.0,
///         max_open_positions: usize = 5,
///     }
/// }
/// ```
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}
