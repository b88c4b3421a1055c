//! Core option table

use super::OptionSpec;

/// CPU feature toggles; each disables the matching capability when false
pub const CPU_TOGGLES: &[&str] = &["fpu", "mmx", "3dn", "mmxext", "sse", "sse2", "altivec"];

/// Options owned by the `main` module
pub fn core_options() -> Vec<OptionSpec> {
    let mut options = vec![
        // Informational requests
        OptionSpec::flag("help", false, "Print help for the core options and exit")
            .short('h')
            .transient(),
        OptionSpec::flag("longhelp", false, "Print help for all modules and exit")
            .short('H')
            .transient(),
        OptionSpec::flag("version", false, "Print version information and exit").transient(),
        OptionSpec::flag("list", false, "List available modules and exit")
            .short('l')
            .transient(),
        OptionSpec::string("module", "", "Print help for one module and exit")
            .short('p')
            .transient(),
        // Configuration maintenance
        OptionSpec::flag("reset-plugins-cache", false, "Rebuild the plugin cache").transient(),
        OptionSpec::flag("reset-config", false, "Reset the configuration file to defaults")
            .transient(),
        OptionSpec::flag("save-config", false, "Save the current options to the configuration file")
            .transient(),
        OptionSpec::string("config", "", "Use an alternate configuration file").transient(),
        OptionSpec::string("plugin-path", "", "Additional plugin manifest directory"),
        // Process control
        OptionSpec::flag("daemon", false, "Run as a daemon process")
            .short('d')
            .transient(),
        OptionSpec::string("pidfile", "", "Write the process id to this file when daemonized"),
        OptionSpec::flag(
            "one-instance",
            false,
            "Hand targets to an instance already running in this process",
        ),
        OptionSpec::flag(
            "playlist-enqueue",
            false,
            "Enqueue handed-off targets instead of playing them",
        ),
        // Interfaces
        OptionSpec::string("intf", "", "Main interface module").short('I'),
        OptionSpec::string("extraintf", "", "Extra interface modules, colon separated"),
        OptionSpec::string("control", "", "Control interface modules, colon separated"),
        OptionSpec::flag("disable-screensaver", false, "Inhibit the screensaver during playback"),
        OptionSpec::flag("file-logging", false, "Log to a file"),
        OptionSpec::flag("syslog", false, "Log to syslog"),
        OptionSpec::flag("show-intf", false, "Show the on-screen status interface"),
        OptionSpec::flag("network-synchronisation", false, "Synchronise playback over the network"),
        // Diagnostics
        OptionSpec::count("verbose", "Increase verbosity (repeatable)").short('v'),
        OptionSpec::flag("quiet", false, "Only report errors").short('q'),
        OptionSpec::flag("color", true, "Color diagnostics on terminals"),
        OptionSpec::flag("stats", false, "Collect performance timers"),
        // Playlist
        OptionSpec::string("open", "", "Target to open in addition to positional targets")
            .transient(),
        OptionSpec::string("services-discovery", "", "Service discovery modules, colon separated")
            .short('S'),
        OptionSpec::string("memcpy", "", "Preferred copy strategy module"),
    ];

    options.extend(
        CPU_TOGGLES
            .iter()
            .map(|name| OptionSpec::flag(name, true, &format!("Use the {} CPU capability", name))),
    );

    options
}
