// Unit tests for client_middleware

mod test_auth_middleware;
