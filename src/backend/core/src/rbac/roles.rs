//! Predefined roles with default permission sets.
//!
//! Rolegate ships with six built-in roles, ranked by level:
//!
//! | Role             | Level | Description                                              |
//! |------------------|-------|----------------------------------------------------------|
//! | Super Admin      | 100   | Bypasses every check                                     |
//! | Admin            | 90    | Full access within the organization                      |
//! | Campaign Manager | 70    | Runs campaigns and content for their team                |
//! | KOL Manager      | 60    | Manages influencer rosters and assigned communications   |
//! | Analyst          | 40    | Reads analytics, owns the reports they create            |
//! | Viewer           | 10    | Read-only access to core dashboards                      |

use super::models::{
    ActionType::{Approve, Delete, Export, Manage, Read, Write},
    Condition, Permission,
    ResourceType::{
        Analytics, Billing, Campaigns, Communications, Content, Integrations, Kols, Reports,
        Settings, Users,
    },
    Role, ResourceType, SUPER_ADMIN_ROLE_ID, VIEWER_ROLE_ID,
};

/// Predefined role templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredefinedRole {
    SuperAdmin,
    Admin,
    CampaignManager,
    KolManager,
    Analyst,
    Viewer,
}

impl PredefinedRole {
    pub fn id(&self) -> &'static str {
        match self {
            Self::SuperAdmin => SUPER_ADMIN_ROLE_ID,
            Self::Admin => "admin",
            Self::CampaignManager => "campaign_manager",
            Self::KolManager => "kol_manager",
            Self::Analyst => "analyst",
            Self::Viewer => VIEWER_ROLE_ID,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Super Admin",
            Self::Admin => "Admin",
            Self::CampaignManager => "Campaign Manager",
            Self::KolManager => "KOL Manager",
            Self::Analyst => "Analyst",
            Self::Viewer => "Viewer",
        }
    }

    pub fn level(&self) -> u32 {
        match self {
            Self::SuperAdmin => 100,
            Self::Admin => 90,
            Self::CampaignManager => 70,
            Self::KolManager => 60,
            Self::Analyst => 40,
            Self::Viewer => 10,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Platform operator with unrestricted access",
            Self::Admin => "Full access to resources and settings of the organization",
            Self::CampaignManager => "Runs campaigns and content for their team",
            Self::KolManager => "Manages the KOL roster and assigned communications",
            Self::Analyst => "Reads analytics and maintains their own reports",
            Self::Viewer => "Read-only access to campaigns, KOLs, analytics and reports",
        }
    }

    /// Permission set of this role. Super admin lists every resource for
    /// display even though the evaluator never consults it.
    pub fn permissions(&self) -> Vec<Permission> {
        match self {
            Self::SuperAdmin => ResourceType::ALL
                .into_iter()
                .map(Permission::all_actions)
                .collect(),
            Self::Admin => vec![
                Permission::all_actions(Kols),
                Permission::all_actions(Campaigns),
                Permission::all_actions(Content),
                Permission::all_actions(Communications),
                Permission::new(Analytics, [Read, Export]),
                Permission::new(Settings, [Read, Write, Manage]),
                Permission::new(Users, [Read, Write, Delete, Manage])
                    .with_condition(Condition::organization()),
                Permission::new(Billing, [Read, Manage]).with_condition(Condition::organization()),
                Permission::new(Integrations, [Read, Write, Manage])
                    .with_condition(Condition::organization()),
                Permission::new(Reports, [Read, Write, Delete, Export]),
            ],
            Self::CampaignManager => vec![
                Permission::new(Campaigns, [Read, Write, Approve, Export])
                    .with_condition(Condition::team()),
                Permission::new(Content, [Read, Write, Approve]).with_condition(Condition::team()),
                Permission::new(Kols, [Read, Write]),
                Permission::new(Communications, [Read, Write]).with_condition(Condition::own()),
                Permission::new(Analytics, [Read, Export]),
                Permission::new(Reports, [Read, Write, Export]),
            ],
            Self::KolManager => vec![
                Permission::new(Kols, [Read, Write, Manage])
                    .with_condition(Condition::organization()),
                Permission::new(Communications, [Read, Write])
                    .with_condition(Condition::assigned()),
                Permission::new(Campaigns, [Read]),
                Permission::new(Content, [Read]),
                Permission::new(Analytics, [Read]),
            ],
            Self::Analyst => vec![
                Permission::new(Analytics, [Read, Export]),
                Permission::new(Reports, [Read, Write, Delete, Export])
                    .with_condition(Condition::own()),
                Permission::new(Campaigns, [Read]),
                Permission::new(Kols, [Read]),
            ],
            Self::Viewer => vec![
                Permission::new(Campaigns, [Read]),
                Permission::new(Kols, [Read]),
                Permission::new(Analytics, [Read]),
                Permission::new(Reports, [Read]),
            ],
        }
    }

    pub fn to_role(&self) -> Role {
        let mut role = Role::new(self.id(), self.name(), self.level(), self.description());
        role.permissions = self.permissions();
        role
    }

    /// All predefined roles, most privileged first.
    pub fn all() -> Vec<PredefinedRole> {
        vec![
            Self::SuperAdmin,
            Self::Admin,
            Self::CampaignManager,
            Self::KolManager,
            Self::Analyst,
            Self::Viewer,
        ]
    }

    pub fn all_defaults() -> Vec<Role> {
        Self::all().into_iter().map(|r| r.to_role()).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
