mod collaborator;
mod config;
mod control_plane;
mod logging;
mod runtime;
mod sequence;
mod tape_store;

pub use tape_abi::{
    CONTROL_API_VERSION, ControlRoute, OK_BODY, ROUTE_COUNT, ROUTE_SEQUENCE_RESET,
    ROUTE_TAPES_SET, ROUTES, match_route,
};

pub use collaborator::{BoxFuture, CollaboratorError, SequenceController, TapeStore};
pub use config::{
    ConfigError, ConfigHandle, ControlPlaneConfig, DEFAULT_CONTROL_PLANE_PATH,
    DEFAULT_LISTEN_ADDR, DEFAULT_MAX_CONTROL_BODY_BYTES, DEFAULT_TAPE_PATH, ProxyConfig,
};
pub use control_plane::{
    ControlPlaneError, ControlPlaneExtension, ControlPlaneRequest, ControlPlaneResponse,
    ControlPlaneRouter, DispatchContext, TapesSetCommand,
};
pub use logging::init as init_logging;
pub use runtime::{SharedState, build_app, build_data_app};
pub use sequence::SequenceManager;
pub use tape_store::FsTapeStore;
