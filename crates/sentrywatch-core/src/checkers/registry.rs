//! Wires every built-in checker's factory into a `FactoryRegistry`.
//!
//! The source triggers registration via blank imports that run each
//! plugin's `init()`. Rust has no import-time side effects, so this module
//! makes the wiring explicit.

use crate::checker::FactoryRegistry;
use crate::checkers::{command, http, marathon, process, ssl, supervisor};

pub fn register_builtin(registry: &FactoryRegistry) {
    registry.register(command::KIND, command::factory());
    registry.register(http::KIND, http::factory());
    registry.register(process::KIND, process::factory());
    registry.register(ssl::KIND, ssl::factory());
    registry.register(supervisor::KIND, supervisor::factory());
    registry.register(marathon::KIND, marathon::factory());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_six_builtin_kinds() {
        let registry = FactoryRegistry::new();
        register_builtin(&registry);

        let mut kinds = registry.known_kinds();
        kinds.sort();
        assert_eq!(
            kinds,
            vec!["Command", "HTTP", "Marathon", "Processes", "SSL", "Supervisor"]
        );
    }
}
