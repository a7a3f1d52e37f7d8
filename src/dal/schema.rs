table! {
    categories (id) {
        id -> Uuid,
        groupid -> Uuid,
        name -> Varchar,
        kind -> Varchar,
        createdby -> Int4,
    }
}

table! {
    group_invites (id) {
        id -> Uuid,
        groupid -> Uuid,
        code -> Varchar,
        createdby -> Int4,
        expires -> Timestamptz,
    }
}

table! {
    groups (id) {
        id -> Uuid,
        name -> Varchar,
        ownerid -> Int4,
        created -> Timestamptz,
    }
}

table! {
    users (id) {
        id -> Int4,
        name -> Varchar,
        groupid -> Nullable<Uuid>,
    }
}

joinable!(categories -> groups (groupid));
joinable!(group_invites -> groups (groupid));
joinable!(users -> groups (groupid));

allow_tables_to_appear_in_same_query!(
    categories,
    group_invites,
    groups,
    users,
);
