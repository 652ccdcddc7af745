use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use tracing::warn;

pub const MONITOR_PORT: &str = "MONITOR_PORT";

const DEFAULT_PORT: u16 = 5000;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

pub const MONITOR_ADDR: &str = "MONITOR_ADDR";

const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0));

pub fn get_default_addr() -> IpAddr {
    DEFAULT_ADDR
}

/// Look up and parse a variable, unparsable values are logged and ignored
pub fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let value = lookup(name)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("ignoring invalid value for {name}: {value:?}");
            None
        }
    }
}
