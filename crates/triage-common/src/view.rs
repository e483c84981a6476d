use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::role::normalize;

/// Named query context that decides which tickets a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewMode {
    #[serde(rename = "My Tickets")]
    MyTickets,
    #[serde(rename = "Employee Queries")]
    EmployeeQueries,
    #[serde(rename = "My Queries")]
    MyQueries,
    /// Department-head queries, as seen by admins.
    #[serde(rename = "D-Tickets")]
    DepartmentTickets,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MyTickets => "My Tickets",
            Self::EmployeeQueries => "Employee Queries",
            Self::MyQueries => "My Queries",
            Self::DepartmentTickets => "D-Tickets",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "mytickets" => Ok(Self::MyTickets),
            "employeequeries" => Ok(Self::EmployeeQueries),
            "myqueries" => Ok(Self::MyQueries),
            "dtickets" | "departmenttickets" => Ok(Self::DepartmentTickets),
            _ => Err(format!("Invalid view mode: {}", s)),
        }
    }
}
