// Interface adapters: registration HTTP client, wire protocol, wedge scanner and console.

pub mod clients;
pub mod console;
pub mod protocol;
pub mod utils;
pub mod wedge;
