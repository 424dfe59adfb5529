#![macro_use]
#![allow(unused)]

//! Logging shims. With the `defmt` feature every level forwards to `defmt`,
//! otherwise the arguments are only borrowed so they still type-check.

#[collapse_debuginfo(yes)]
macro_rules! log_at {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::$level!($s $(, $x)*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! trace {
    ($($args:tt)*) => { log_at!(trace, $($args)*) };
}

macro_rules! debug {
    ($($args:tt)*) => { log_at!(debug, $($args)*) };
}

macro_rules! info {
    ($($args:tt)*) => { log_at!(info, $($args)*) };
}

macro_rules! warn {
    ($($args:tt)*) => { log_at!(warn, $($args)*) };
}
