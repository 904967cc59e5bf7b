/// Generate the closed allow-list plumbing for a fieldless enum whose variants
/// are persisted by name: `ALL`, `COUNT`, `index`, `as_str`, `Display`,
/// `FromStr`, and the `String` conversions used by
/// `#[serde(into = "String", try_from = "String")]`.
///
/// Unknown names are rejected with [`crate::UnknownName`]; nothing outside the
/// list can be turned into a value of the enum.
macro_rules! name_enum {
    ($name:ident, $label:expr, { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            /// Number of variants.
            pub const COUNT: usize = Self::ALL.len();

            /// Stable name used in storage and configuration.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)+
                }
            }

            /// Position of the variant in [`Self::ALL`].
            pub fn index(self) -> usize {
                self as usize
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::UnknownName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($str => Ok($name::$variant),)+
                    other => Err($crate::UnknownName {
                        kind: $label,
                        name: other.to_string(),
                    }),
                }
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.as_str().to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::UnknownName;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

pub(crate) use name_enum;
