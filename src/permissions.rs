//! Role and permission model. Two roles: the school owner has everything,
//! staff get the day-to-day subset (no deletes, no staff management, no bulk
//! SMS, no data import/export).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Staff,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "owner" => Some(Role::Owner),
            "staff" => Some(Role::Staff),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Staff => "staff",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Owner => "Owner/Admin",
            Role::Staff => "Staff",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Role::Owner => "School owner/headmaster with full access to manage everything",
            Role::Staff => "School staff with access to add/edit students and send SMS",
        }
    }
}

pub const ALL_ROLES: [Role; 2] = [Role::Owner, Role::Staff];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    SchoolManage,
    SchoolDelete,
    SchoolSettings,
    StaffManage,
    StaffAdd,
    StaffRemove,
    StudentsView,
    StudentsAdd,
    StudentsEdit,
    StudentsDelete,
    ParentsView,
    ParentsAdd,
    ParentsEdit,
    ParentsDelete,
    SmsSend,
    SmsBulk,
    AnalyticsView,
    DataImport,
    DataExport,
}

impl Permission {
    pub fn parse(s: &str) -> Option<Permission> {
        use Permission::*;
        Some(match s {
            "school:manage" => SchoolManage,
            "school:delete" => SchoolDelete,
            "school:settings" => SchoolSettings,
            "staff:manage" => StaffManage,
            "staff:add" => StaffAdd,
            "staff:remove" => StaffRemove,
            "students:view" => StudentsView,
            "students:add" => StudentsAdd,
            "students:edit" => StudentsEdit,
            "students:delete" => StudentsDelete,
            "parents:view" => ParentsView,
            "parents:add" => ParentsAdd,
            "parents:edit" => ParentsEdit,
            "parents:delete" => ParentsDelete,
            "sms:send" => SmsSend,
            "sms:bulk" => SmsBulk,
            "analytics:view" => AnalyticsView,
            "data:import" => DataImport,
            "data:export" => DataExport,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        use Permission::*;
        match self {
            SchoolManage => "school:manage",
            SchoolDelete => "school:delete",
            SchoolSettings => "school:settings",
            StaffManage => "staff:manage",
            StaffAdd => "staff:add",
            StaffRemove => "staff:remove",
            StudentsView => "students:view",
            StudentsAdd => "students:add",
            StudentsEdit => "students:edit",
            StudentsDelete => "students:delete",
            ParentsView => "parents:view",
            ParentsAdd => "parents:add",
            ParentsEdit => "parents:edit",
            ParentsDelete => "parents:delete",
            SmsSend => "sms:send",
            SmsBulk => "sms:bulk",
            AnalyticsView => "analytics:view",
            DataImport => "data:import",
            DataExport => "data:export",
        }
    }

    pub fn describe(&self) -> &'static str {
        use Permission::*;
        match self {
            SchoolManage => "Manage school account and settings",
            SchoolDelete => "Delete school account",
            SchoolSettings => "Configure school settings and branding",
            StaffManage => "Manage staff members",
            StaffAdd => "Add new staff members",
            StaffRemove => "Remove staff members",
            StudentsView => "View student information",
            StudentsAdd => "Add new students",
            StudentsEdit => "Edit student details",
            StudentsDelete => "Delete students",
            ParentsView => "View parent information",
            ParentsAdd => "Add new parents",
            ParentsEdit => "Edit parent details",
            ParentsDelete => "Delete parents",
            SmsSend => "Send SMS messages",
            SmsBulk => "Send bulk SMS messages",
            AnalyticsView => "View analytics and reports",
            DataImport => "Import data",
            DataExport => "Export data",
        }
    }
}

const OWNER_PERMISSIONS: [Permission; 19] = [
    Permission::SchoolManage,
    Permission::SchoolDelete,
    Permission::SchoolSettings,
    Permission::StaffManage,
    Permission::StaffAdd,
    Permission::StaffRemove,
    Permission::StudentsView,
    Permission::StudentsAdd,
    Permission::StudentsEdit,
    Permission::StudentsDelete,
    Permission::ParentsView,
    Permission::ParentsAdd,
    Permission::ParentsEdit,
    Permission::ParentsDelete,
    Permission::SmsSend,
    Permission::SmsBulk,
    Permission::AnalyticsView,
    Permission::DataImport,
    Permission::DataExport,
];

const STAFF_PERMISSIONS: [Permission; 8] = [
    Permission::StudentsView,
    Permission::StudentsAdd,
    Permission::StudentsEdit,
    Permission::ParentsView,
    Permission::ParentsAdd,
    Permission::ParentsEdit,
    Permission::SmsSend,
    Permission::AnalyticsView,
];

pub fn role_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Owner => &OWNER_PERMISSIONS,
        Role::Staff => &STAFF_PERMISSIONS,
    }
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    role_permissions(role).contains(&permission)
}
