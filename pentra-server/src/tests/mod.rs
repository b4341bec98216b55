mod agent_bus_tests;
mod test_utils;
