// Unit tests for auth_flows
