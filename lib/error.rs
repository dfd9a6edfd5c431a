//! Provides `ErrMsg`, a simple trait to associate a constant string with a
//! data-less error type, and `mkerr`, a macro to declare such a type together
//! with its `Display` and `Error` implementations.
//!
//! Errors that need to carry data (parse positions, offending values, etc.) are
//! declared with [`thiserror`] in their own modules instead.

/// Simple trait to associate a constant string with an error type.
pub trait ErrMsg {
    fn msg(&self) -> &'static str;
}

/// Declare a fieldless error enum along with implementations of `ErrMsg`,
/// `Display`, and `Error`.
///
/// ```
/// pdfsample::mkerr!(
///     DemoError : {
///         Empty => "nothing to do",
///         TooBig => "input exceeds the allowed size",
///     }
/// );
/// assert_eq!(DemoError::Empty.to_string(), "nothing to do");
/// ```
#[macro_export]
macro_rules! mkerr {
    ( $name:ident : { $( $var:ident => $msg:literal ),+ $(,)? } ) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum $name {
            $( $var, )+
        }

        impl $crate::error::ErrMsg for $name {
            fn msg(&self) -> &'static str {
                return match *self {
                    $( $name::$var => $msg, )+
                };
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                return f.write_str($crate::error::ErrMsg::msg(self));
            }
        }

        impl std::error::Error for $name { }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrMsg;

    crate::mkerr!(
        TestError : {
            First => "first failure",
            Second => "second failure",
        }
    );

    #[test]
    fn messages_are_attached_per_variant() {
        assert_eq!(TestError::First.msg(), "first failure");
        assert_eq!(TestError::Second.to_string(), "second failure");
        let boxed: Box<dyn std::error::Error> = Box::new(TestError::Second);
        assert_eq!(boxed.to_string(), "second failure");
    }
}
