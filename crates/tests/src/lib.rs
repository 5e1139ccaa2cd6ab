#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod health_check_tests;
#[cfg(test)]
mod recorder_finalizer_tests;
#[cfg(test)]
mod streaming_manager_tests;
#[cfg(test)]
mod streaming_ws_tests;
#[cfg(test)]
mod version_store_tests;
