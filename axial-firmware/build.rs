//! Build script for axial-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Parses and validates machine.toml at compile time
//! - Embeds the validated configuration as postcard bytes

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use axial_core::config::{
    AxisId, BusId, ChipFamily, DriverConfig, DriverPolicy, KinematicParams, MachineConfig,
    TransportConfig,
};

/// GPIO pins on RP2040
const GPIO_COUNT: i64 = 30;

/// Pins wired to SPI0 (16/18/19) and UART1 (8/9)
const RESERVED_PINS: [i64; 5] = [8, 9, 16, 18, 19];

fn main() {
    setup_linker();
    let config = load_config();
    embed_config(&config);
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Copy memory.x to the output directory
    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());

    // Re-run if memory.x changes
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Read machine.toml and turn it into a validated configuration
fn load_config() -> MachineConfig {
    println!("cargo:rerun-if-changed=machine.toml");

    let config_path = Path::new("machine.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: machine.toml not found!                                  ║\n\
            ║                                                                  ║\n\
            ║  The firmware requires a machine.toml configuration file.        ║\n\
            ║  Please create one in the axial-firmware directory.              ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read machine.toml                              ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let value: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in machine.toml                      ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                ║                                                                  ║\n\
                {}\n\
                ║                                                                  ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    let config = match build_config(&value) {
        Ok(config) => config,
        Err(errors) => report_errors("Invalid driver configuration", &errors),
    };

    // Checks that need the whole table, e.g. policy against per-axis settings
    if let Err(e) = config.validate() {
        report_errors("Unsupported driver configuration", &[e.to_string()]);
    }

    println!(
        "cargo:warning=machine.toml validated successfully ({} axes)",
        config.bindings.len()
    );
    config
}

/// Write the configuration where main.rs includes it from
fn embed_config(config: &MachineConfig) {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let bytes = postcard::to_allocvec(config).unwrap();
    fs::write(out_dir.join("machine_config.bin"), bytes).unwrap();
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Abort the build with a boxed list of errors
fn report_errors(title: &str, errors: &[String]) -> ! {
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        errors
            .iter()
            .map(|e| format!("║  • {:<62} ║", e))
            .collect::<Vec<_>>()
            .join("\n")
    );
}

/// Assemble a `MachineConfig`, binding each axis through the same checks
/// the firmware relies on at run time
fn build_config(value: &toml::Value) -> Result<MachineConfig, Vec<String>> {
    let mut errors = Vec::new();
    let mut config = MachineConfig::new();

    if let Some(version) = value.get("version") {
        if version.as_integer() != Some(MachineConfig::VERSION as i64) {
            errors.push(format!(
                "version must be {} (found {})",
                MachineConfig::VERSION,
                version
            ));
        }
    }

    if let Some(policy) = value.get("policy") {
        match policy.clone().try_into::<DriverPolicy>() {
            Ok(policy) => config.policy = policy,
            Err(e) => errors.push(format!("[policy] {}", first_line(&e.to_string()))),
        }
    }

    if let Some(kinematics) = value.get("kinematics") {
        match kinematics.clone().try_into::<KinematicParams>() {
            Ok(kinematics) => config.kinematics = kinematics,
            Err(e) => errors.push(format!("[kinematics] {}", first_line(&e.to_string()))),
        }
    }

    let axes = match value.get("axis") {
        Some(toml::Value::Table(t)) => t.clone(),
        Some(_) => {
            errors.push("[axis] must be a table of slots".to_string());
            toml::Table::new()
        }
        None => toml::Table::new(),
    };

    for (name, entry) in &axes {
        let Some(axis) = AxisId::from_name(name) else {
            errors.push(format!("[axis.{}] is not an axis slot", name));
            continue;
        };
        let Some(table) = entry.as_table() else {
            errors.push(format!("[axis.{}] must be a table", name));
            continue;
        };

        let parsed = parse_driver(entry, table).and_then(|driver| {
            parse_transport(table).map(|transport| (driver, transport))
        });
        match parsed {
            Ok((driver, transport)) => {
                if let Err(e) = config.bindings.bind(axis, driver, transport) {
                    errors.push(format!("[axis.{}] {}", name, e));
                }
            }
            Err(e) => errors.push(format!("[axis.{}] {}", name, e)),
        }
    }

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(errors)
    }
}

/// Chip family and its settings
fn parse_driver(entry: &toml::Value, table: &toml::Table) -> Result<DriverConfig, String> {
    let family = match table.get("driver") {
        Some(toml::Value::String(name)) => ChipFamily::from_name(name)
            .ok_or_else(|| format!("unknown driver '{}'", name))?,
        Some(_) => return Err("'driver' must be a string".to_string()),
        None => return Err("missing 'driver'".to_string()),
    };

    // Settings share the slot table with the driver/transport keys
    let settings = entry.clone();
    let driver = match family {
        ChipFamily::Tmc26x => settings.try_into().map(DriverConfig::Tmc26x),
        ChipFamily::Tmc2130 => settings.try_into().map(DriverConfig::Tmc2130),
        ChipFamily::Tmc2208 => settings.try_into().map(DriverConfig::Tmc2208),
        ChipFamily::L6470 => settings.try_into().map(DriverConfig::L6470),
    };
    driver.map_err(|e| first_line(&e.to_string()).to_string())
}

/// How the chip is reached
fn parse_transport(table: &toml::Table) -> Result<TransportConfig, String> {
    match table.get("transport").and_then(|t| t.as_str()) {
        Some("spi") => {
            let bus = bus_id(table, "bus")?;
            let cs_pin = pin(table, "cs_pin")?;
            Ok(TransportConfig::Spi { bus, cs_pin })
        }
        Some("uart") => Ok(TransportConfig::HardwareSerial {
            port: bus_id(table, "port")?,
        }),
        Some("soft_serial") => {
            let rx_pin = match table.get("rx_pin") {
                Some(_) => Some(pin(table, "rx_pin")?),
                None => None,
            };
            let tx_pin = pin(table, "tx_pin")?;
            Ok(TransportConfig::SoftwareSerial { rx_pin, tx_pin })
        }
        Some(other) => Err(format!(
            "transport must be 'spi', 'uart' or 'soft_serial', not '{}'",
            other
        )),
        None => Err("missing 'transport'".to_string()),
    }
}

/// The board has one SPI bus and one hardware UART, both id 0
fn bus_id(table: &toml::Table, key: &str) -> Result<BusId, String> {
    match table.get(key).and_then(|v| v.as_integer()) {
        Some(0) | None => Ok(BusId(0)),
        Some(other) => Err(format!("{} {} does not exist on this board", key, other)),
    }
}

fn pin(table: &toml::Table, key: &str) -> Result<u8, String> {
    let value = table
        .get(key)
        .ok_or_else(|| format!("missing '{}'", key))?
        .as_integer()
        .ok_or_else(|| format!("'{}' must be a GPIO number", key))?;

    if !(0..GPIO_COUNT).contains(&value) {
        return Err(format!("{} gpio{} out of range (0-29)", key, value));
    }
    if RESERVED_PINS.contains(&value) {
        return Err(format!("{} gpio{} is used by SPI0/UART1", key, value));
    }
    Ok(value as u8)
}

fn first_line(msg: &str) -> &str {
    msg.lines().next().unwrap_or(msg)
}
