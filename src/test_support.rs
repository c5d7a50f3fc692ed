//! Helpers shared by unit tests.

pub(crate) mod socket_guard {
    use std::net::TcpListener;
    use std::panic::Location;

    use wiremock::MockServer;

    /// Env var that turns "cannot bind a socket" from a skip into a failure.
    const REQUIRE_SOCKET_TESTS_ENV: &str = "MEDIABATCH_REQUIRE_SOCKET_TESTS";

    fn socket_tests_required() -> bool {
        std::env::var(REQUIRE_SOCKET_TESTS_ENV)
            .ok()
            .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    }

    #[track_caller]
    fn should_skip_socket_bound_test() -> bool {
        if TcpListener::bind("127.0.0.1:0").is_ok() {
            return false;
        }

        let location = Location::caller();
        let message = format!(
            "[socket-bound-test] cannot bind localhost socket at {}:{}",
            location.file(),
            location.line()
        );
        assert!(
            !socket_tests_required(),
            "{message}; unset {REQUIRE_SOCKET_TESTS_ENV} to allow skipping"
        );
        eprintln!("{message}; skipping test");
        true
    }

    /// Starts a wiremock server, or returns `None` when the sandbox forbids sockets.
    #[track_caller]
    pub(crate) fn start_mock_server_or_skip() -> impl std::future::Future<Output = Option<MockServer>>
    {
        let skip = should_skip_socket_bound_test();
        async move {
            if skip {
                None
            } else {
                Some(MockServer::start().await)
            }
        }
    }
}
