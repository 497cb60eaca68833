//! Closed command table.
//!
//! The bridge's vocabulary is a compile-time static table; nothing registers
//! commands at runtime. Tier and token-exemption are properties of the table
//! entry, never runtime flags, so authorization cannot drift after startup.

/// Capability tier a command requires and a session is capped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Read-only observation.
    Observe = 0,
    /// Simulated input injection.
    Input = 1,
    /// State mutation.
    Control = 2,
    /// Arbitrary expression evaluation.
    Danger = 3,
}

impl Tier {
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Clamp an arbitrary level into the valid range.
    pub fn from_level(level: i64) -> Tier {
        match level {
            i64::MIN..=0 => Tier::Observe,
            1 => Tier::Input,
            2 => Tier::Control,
            _ => Tier::Danger,
        }
    }
}

/// One entry of the static command table.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tier: Tier,
    /// Commands usable without the session token (discovery surface).
    pub token_exempt: bool,
    /// Commands whose response is resolved asynchronously across frames.
    pub deferred: bool,
}

const fn cmd(name: &'static str, tier: Tier) -> CommandSpec {
    CommandSpec {
        name,
        tier,
        token_exempt: false,
        deferred: false,
    }
}

const fn exempt(name: &'static str, tier: Tier) -> CommandSpec {
    CommandSpec {
        name,
        tier,
        token_exempt: true,
        deferred: false,
    }
}

const fn deferred(name: &'static str, tier: Tier) -> CommandSpec {
    CommandSpec {
        name,
        tier,
        token_exempt: false,
        deferred: true,
    }
}

/// The full command vocabulary. Kept alphabetical within each tier group.
pub const COMMANDS: &[CommandSpec] = &[
    // Tier 0: observe.
    exempt("ping", Tier::Observe),
    exempt("auth_info", Tier::Observe),
    cmd("audio_state", Tier::Observe),
    cmd("capabilities", Tier::Observe),
    cmd("find_nodes", Tier::Observe),
    cmd("get_errors", Tier::Observe),
    cmd("get_property", Tier::Observe),
    cmd("grb_performance", Tier::Observe),
    cmd("network_state", Tier::Observe),
    cmd("runtime_info", Tier::Observe),
    cmd("scene_tree", Tier::Observe),
    cmd("screenshot", Tier::Observe),
    deferred("wait_for", Tier::Observe),
    // Tier 1: input.
    cmd("click", Tier::Input),
    cmd("drag", Tier::Input),
    cmd("gamepad", Tier::Input),
    cmd("gesture", Tier::Input),
    cmd("key", Tier::Input),
    cmd("press_button", Tier::Input),
    cmd("scroll", Tier::Input),
    // Tier 2: control.
    cmd("call_method", Tier::Control),
    cmd("quit", Tier::Control),
    cmd("run_custom_command", Tier::Control),
    cmd("set_property", Tier::Control),
    // Tier 3: danger.
    cmd("eval", Tier::Danger),
];

/// Look up a command by name.
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name == name)
}

pub fn is_known(name: &str) -> bool {
    find(name).is_some()
}

pub fn is_token_exempt(name: &str) -> bool {
    find(name).map(|spec| spec.token_exempt).unwrap_or(false)
}

/// Sorted names of every command at or below `max_tier`.
pub fn commands_for_tier(max_tier: Tier) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = COMMANDS
        .iter()
        .filter(|spec| spec.tier <= max_tier)
        .map(|spec| spec.name)
        .collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_no_duplicates() {
        let mut names: Vec<_> = COMMANDS.iter().map(|spec| spec.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn test_tier_assignments() {
        assert_eq!(find("ping").unwrap().tier, Tier::Observe);
        assert_eq!(find("click").unwrap().tier, Tier::Input);
        assert_eq!(find("set_property").unwrap().tier, Tier::Control);
        assert_eq!(find("eval").unwrap().tier, Tier::Danger);
        assert!(find("does_not_exist").is_none());
    }

    #[test]
    fn test_token_exempt_set() {
        let exempt: Vec<_> = COMMANDS
            .iter()
            .filter(|spec| spec.token_exempt)
            .map(|spec| spec.name)
            .collect();
        assert_eq!(exempt, vec!["ping", "auth_info"]);
    }

    #[test]
    fn test_only_wait_for_is_deferred() {
        let deferred: Vec<_> = COMMANDS
            .iter()
            .filter(|spec| spec.deferred)
            .map(|spec| spec.name)
            .collect();
        assert_eq!(deferred, vec!["wait_for"]);
    }

    #[test]
    fn test_tier_projection_is_sorted_and_monotonic() {
        let observe = commands_for_tier(Tier::Observe);
        let input = commands_for_tier(Tier::Input);
        let control = commands_for_tier(Tier::Control);
        let danger = commands_for_tier(Tier::Danger);

        for window in input.windows(2) {
            assert!(window[0] < window[1]);
        }
        assert!(observe.contains(&"screenshot"));
        assert!(!observe.contains(&"click"));
        assert!(input.contains(&"click"));
        assert!(!input.contains(&"set_property"));
        assert!(control.contains(&"set_property"));
        assert!(control.contains(&"call_method"));
        assert!(!control.contains(&"eval"));
        assert!(danger.contains(&"eval"));
        assert_eq!(danger.len(), COMMANDS.len());
    }

    #[test]
    fn test_tier_clamping() {
        assert_eq!(Tier::from_level(-5), Tier::Observe);
        assert_eq!(Tier::from_level(0), Tier::Observe);
        assert_eq!(Tier::from_level(1), Tier::Input);
        assert_eq!(Tier::from_level(2), Tier::Control);
        assert_eq!(Tier::from_level(3), Tier::Danger);
        assert_eq!(Tier::from_level(99), Tier::Danger);
    }
}
