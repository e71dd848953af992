pub mod cli;
pub mod configuration;
pub mod connection_tester;
pub mod healthcheck;
pub mod ldap;
pub mod logging;
pub mod orchestrator;
pub mod scheduler;
pub mod tcp_server;
