use clustermsi_domain::ClusterDocument;

/// Render the identity-relevant parts of a cluster document as text.
pub fn render_document(doc: &ClusterDocument) -> String {
    let mut out = format!("{} (id {}, version {})\n", doc.key, doc.id, doc.version);
    out.push_str(&format!(
        "  workload identity: {}\n",
        if doc.cluster.uses_workload_identity() { "yes" } else { "no" }
    ));

    let Some(identity) = &doc.cluster.identity else {
        out.push_str("  identity: none\n");
        return out;
    };
    out.push_str(&format!("  tenant: {}\n", identity.tenant_id));

    let mut ids: Vec<_> = identity.user_assigned_identities.iter().collect();
    ids.sort_by(|a, b| a.0.cmp(b.0));
    for (rid, uai) in ids {
        out.push_str(&format!("  msi {}\n", rid));
        out.push_str(&format!("    client id:    {}\n", or_dash(&uai.client_id)));
        out.push_str(&format!("    principal id: {}\n", or_dash(&uai.principal_id)));
    }
    out
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustermsi_domain::{Cluster, ClusterIdentity, DocumentKey, UserAssignedIdentity};

    #[test]
    fn document_without_identity() {
        let doc = ClusterDocument::new("id", DocumentKey::new("k"), Cluster::default());
        let out = render_document(&doc);
        assert!(out.starts_with("k (id id, version 0)"), "got: {}", out);
        assert!(out.contains("identity: none"));
    }

    #[test]
    fn identity_entries_are_listed() {
        let mut identity = ClusterIdentity {
            tenant_id: "t".into(),
            ..Default::default()
        };
        identity.user_assigned_identities.insert(
            "/subscriptions/s/resourceGroups/r/providers/p/t/msi".into(),
            UserAssignedIdentity {
                client_id: "c".into(),
                principal_id: String::new(),
            },
        );
        let doc = ClusterDocument::new(
            "id",
            DocumentKey::new("k"),
            Cluster {
                identity: Some(identity),
                ..Default::default()
            },
        );
        let out = render_document(&doc);
        assert!(out.contains("tenant: t"));
        assert!(out.contains("client id:    c"));
        assert!(out.contains("principal id: -"));
    }
}
