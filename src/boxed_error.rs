
/// Define an error type wrapper e.g. `Foo` around a
/// `Box<FooKind>`, so that `Result<T, Foo>` stays one word wide
/// however large `FooKind` grows. Implements `std::error::Error`,
/// `Display`, `Deref` to the kind, and a forwarding `From`, so that
/// `thiserror`'s `#[from]` on the kind still works with `?`.
#[macro_export]
macro_rules! def_boxed_error {
    ($wrappername:ident, $kindname:ident) => {

        #[derive(Debug)]
        pub struct $wrappername(Box<$kindname>);

        impl $wrappername {
            pub fn kind(&self) -> &$kindname {
                &self.0
            }
        }

        impl std::ops::Deref for $wrappername {
            type Target = $kindname;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<E> From<E> for $wrappername where $kindname: From<E> {
            fn from(err: E) -> Self {
                $wrappername(Box::new($kindname::from(err)))
            }
        }

        impl std::error::Error for $wrappername {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                std::error::Error::source(&*self.0)
            }
        }

        impl std::fmt::Display for $wrappername {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&*self.0, f)
            }
        }
    }
}


/// Defines both an error kind (deriving `thiserror::Error`) and its
/// box wrapper as per `def_boxed_error`.
#[macro_export]
macro_rules! def_boxed_thiserror {
    ($wrappername:ident, $vis:vis enum $kindname:ident {$($body:tt)*}) => {
        #[derive(thiserror::Error, Debug)]
        $vis enum $kindname {
            $($body)*
        }
        $crate::def_boxed_error!($wrappername, $kindname);
    };
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    def_boxed_thiserror!(ProbeError, pub enum ProbeErrorKind {
        #[error("probe failed: {0}")]
        Failed(String),
        #[error("probe io")]
        Io(#[from] std::io::Error),
    });

    fn fails() -> Result<(), ProbeError> {
        Err(ProbeErrorKind::Failed("too hot".into()))?
    }

    fn io_fails() -> Result<(), ProbeError> {
        Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "disk"))?;
        Ok(())
    }

    #[test]
    fn t_wrapper_is_one_word() {
        assert_eq!(size_of::<ProbeError>(), size_of::<usize>());
    }

    #[test]
    fn t_display_and_kind() {
        let e = fails().unwrap_err();
        assert_eq!(e.to_string(), "probe failed: too hot");
        assert!(matches!(e.kind(), ProbeErrorKind::Failed(_)));
        let e = io_fails().unwrap_err();
        assert!(matches!(&*e, ProbeErrorKind::Io(_)));
        assert!(std::error::Error::source(&e).is_some());
    }
}
