//! HTTP and WebSocket surface over the workflow service.
//!
//! | Route                              | Operation                       |
//! |------------------------------------|---------------------------------|
//! | `GET /health`                      | liveness                        |
//! | `GET /api/me`                      | resolved actor + view modes     |
//! | `POST /api/tickets`                | raise a ticket                  |
//! | `GET /api/tickets?view=`           | list tickets under a view mode  |
//! | `GET /api/tickets/{id}`            | fetch one visible ticket        |
//! | `PATCH /api/tickets/{id}/status`   | transition status with a remark |
//! | `PUT /api/tickets/{id}/forward`    | forward to admin                |
//! | `DELETE /api/tickets/{id}`         | delete own / escalated ticket   |
//! | `GET /ws?view=`                    | filtered domain event stream    |

pub mod api;
pub mod identity;
pub mod server;
pub mod ws;

pub use server::{ServerConfig, build_router, start_server};
