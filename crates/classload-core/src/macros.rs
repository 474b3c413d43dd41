//! Macros for plugin libraries.

/// Export the registration entry point of a plugin library.
///
/// Each `Concrete => Base` pair becomes a [`ConcreteFactory`](crate::ConcreteFactory)
/// named after the concrete type and registered with the loading session.
///
/// ```rust,ignore
/// classload_core::export_factories! {
///     Dog => dyn Animal,
///     Cat => dyn Animal,
/// }
/// ```
///
/// A loader configured with a different `register_symbol` needs the symbol
/// spelled out:
///
/// ```rust,ignore
/// classload_core::export_factories! {
///     symbol = "zoo_register";
///     Dog => dyn Animal,
/// }
/// ```
#[macro_export]
macro_rules! export_factories {
    (symbol = $symbol:literal; $($concrete:ty => $base:ty),+ $(,)?) => {
        #[export_name = $symbol]
        pub fn __classload_register_factories(registrar: &mut $crate::Registrar<'_>) {
            $crate::__register_all!(registrar; $($concrete => $base),+);
        }
    };
    ($($concrete:ty => $base:ty),+ $(,)?) => {
        #[no_mangle]
        pub fn classload_register_factories(registrar: &mut $crate::Registrar<'_>) {
            $crate::__register_all!(registrar; $($concrete => $base),+);
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __register_all {
    ($registrar:ident; $($concrete:ty => $base:ty),+) => {
        $(
            match $crate::concrete_factory!($concrete => $base) {
                Ok(factory) => $registrar.register::<$base, _>(factory),
                Err(e) => $registrar.report_error(e),
            }
        )+
    };
}
