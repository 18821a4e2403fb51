#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlRoute {
    pub index: u16,
    pub name: &'static str,
    pub method: &'static str,
    pub prefix: &'static str,
}

pub const CONTROL_API_VERSION: u16 = 1;

/// Body returned by every built-in command on success.
pub const OK_BODY: &str = "OK";

pub const ROUTE_SEQUENCE_RESET: u16 = 0;
pub const ROUTE_TAPES_SET: u16 = 1;

/// Built-in routes in dispatch order. The first match wins.
pub const ROUTES: [ControlRoute; 2] = [
    ControlRoute {
        index: ROUTE_SEQUENCE_RESET,
        name: "sequence_reset",
        method: "POST",
        prefix: "/sequence/reset",
    },
    ControlRoute {
        index: ROUTE_TAPES_SET,
        name: "tapes_set",
        method: "POST",
        prefix: "/tapes/set",
    },
];

pub const ROUTE_COUNT: u16 = ROUTES.len() as u16;

impl ControlRoute {
    /// Exact method match plus a byte-prefix match on the mount-relative URL.
    pub fn matches(&self, method: &str, clean_url: &str) -> bool {
        self.method == method && clean_url.starts_with(self.prefix)
    }
}

pub fn match_route(method: &str, clean_url: &str) -> Option<&'static ControlRoute> {
    ROUTES.iter().find(|route| route.matches(method, clean_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_are_dense_and_ordered() {
        for (position, route) in ROUTES.iter().enumerate() {
            assert_eq!(route.index as usize, position);
        }
        assert_eq!(ROUTE_COUNT as usize, ROUTES.len());
    }

    #[test]
    fn match_requires_post_and_prefix() {
        let reset = match_route("POST", "/sequence/reset").expect("reset should match");
        assert_eq!(reset.index, ROUTE_SEQUENCE_RESET);

        let set = match_route("POST", "/tapes/set?force=1").expect("prefix should match");
        assert_eq!(set.index, ROUTE_TAPES_SET);

        assert!(match_route("GET", "/sequence/reset").is_none());
        assert!(match_route("post", "/sequence/reset").is_none());
        assert!(match_route("POST", "/Sequence/Reset").is_none());
        assert!(match_route("POST", "sequence/reset").is_none());
        assert!(match_route("POST", "/tapes").is_none());
    }

    #[test]
    fn prefix_match_is_not_segment_aware() {
        let route = match_route("POST", "/sequence/resetall").expect("byte prefix should match");
        assert_eq!(route.name, "sequence_reset");
    }
}
