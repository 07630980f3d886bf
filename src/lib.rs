// Library root
// -----------
// Imports regions of interest from a CSV file into an OMERO server. The
// binary (`main.rs`) wires these modules into the interactive flow.
//
// Module responsibilities:
// - `api`: HTTP calls to the OMERO.web JSON API (login, groups, save,
//   keep-alive, logout).
// - `session`: authenticated, group-scoped session built on `api`, plus
//   the traits the rest of the crate talks to.
// - `shapes`: the four shape kinds and their JSON encoding.
// - `import`: CSV row to shape mapping and the per-row upload loop.
// - `ui`: prompts and notifications.
// - `driver`: the ordered prompt flow that ties everything together.
// - `config`: built-in settings (keep-alive interval, prompt defaults).
pub mod api;
pub mod config;
pub mod driver;
pub mod import;
pub mod session;
pub mod shapes;
pub mod ui;
