use std::{cell::RefCell, ffi::OsStr};

#[derive(Clone, Copy)]
struct Env {
    hex_output: bool,
    minimal: bool,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

pub fn init() {
    let value = Env {
        hex_output: var_is("MARIE_HEX", "1"),
        minimal: var_is("MARIE_MINIMAL", "1"),
    };
    set_env(value);
}

/// Output sequences are shown in hexadecimal unless asked otherwise.
pub fn is_hex_output() -> bool {
    with_env(|env| env.hex_output)
}

/// Minimal, colour-free output is on for every command.
pub fn is_minimal() -> bool {
    with_env(|env| env.minimal)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_once() {
        // Each test runs on its own thread, so state starts uninitialized
        set_env(Env {
            hex_output: true,
            minimal: false,
        });
        assert!(is_hex_output());
        assert!(!is_minimal());
    }

    #[test]
    #[should_panic(expected = "before initialization")]
    fn access_before_init() {
        is_hex_output();
    }

    #[test]
    fn var_comparison() {
        assert!(!var_is("MARIE_SURELY_UNSET_VARIABLE", "1"));
    }
}
