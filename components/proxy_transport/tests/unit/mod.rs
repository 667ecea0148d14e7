// Unit tests for proxy_transport

mod test_proxy;
