mod bootstrap;
mod config;
mod loop_runner;
mod scenario;
mod services;

pub(crate) use bootstrap::build_app;
pub(crate) use loop_runner::run;

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
