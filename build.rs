//! Build script for sd-spi
//!
//! Reads the back-end selector and the software SPI pin numbers from the
//! environment and turns them into cfgs and generated constants.

use std::env;
use std::fs;
use std::path::PathBuf;

const SELECTOR: &str = "SD_SPI_CONFIGURATION";
const PINS: [(&str, u8); 3] = [
    ("SOFT_SPI_MISO_PIN", 12),
    ("SOFT_SPI_MOSI_PIN", 11),
    ("SOFT_SPI_SCK_PIN", 13),
];

fn read_u8(name: &str, default: u8) -> u8 {
    println!("cargo::rerun-if-env-changed={name}");

    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("bad {name}: {value:?}, expected an integer in 0..=255")),
        Err(env::VarError::NotPresent) => default,
        Err(err) => panic!("bad {name}: {err}"),
    }
}

fn main() {
    println!("cargo::rustc-check-cfg=cfg(sd_spi_backend, values(\"register\", \"library\", \"software\"))");
    println!("cargo::rustc-check-cfg=cfg(sd_spi_dynamic)");

    let configuration = read_u8(SELECTOR, 0);
    let backend = match configuration {
        0 => "register",
        1 => "library",
        2 => "software",
        _ => {
            println!("cargo::rustc-cfg=sd_spi_dynamic");
            "register"
        }
    };
    println!("cargo::rustc-cfg=sd_spi_backend=\"{backend}\"");

    let mut generated = format!("/// Back-end selector this crate was built with.\npub const {SELECTOR}: u8 = {configuration};\n");
    for (name, default) in PINS {
        let pin = read_u8(name, default);
        generated.push_str(&format!("/// Software SPI pin bound by the selector.\npub const {name}: u8 = {pin};\n"));
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    fs::write(out_dir.join("selector.rs"), generated).expect("Failed to write selector constants");
}
