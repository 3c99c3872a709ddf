//! Graph mutation building.
//!
//! Translates one artifact's extracted references and SOQL statement tree
//! into a sequence of idempotent node and edge upserts.

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error};

use crate::config::LiteralPairing;
use crate::errors::Result;
use crate::graph::GraphStore;
use crate::resolution::RelationshipResolver;
use crate::types::{
    EdgeSpec, ExtractionResult, MutationReport, NodeRef, ReferenceKind, SoqlStatement,
    TriggerArtifact,
};

/// Builds graph mutations for one artifact at a time.
pub struct MutationBuilder<'a> {
    store: &'a dyn GraphStore,
    pairing: LiteralPairing,
}

impl<'a> MutationBuilder<'a> {
    pub fn new(store: &'a dyn GraphStore, pairing: LiteralPairing) -> Self {
        Self { store, pairing }
    }

    /// Applies all graph mutations for `artifact`: the artifact node itself,
    /// one edge per type reference, and the recursive edge set for each SOQL
    /// statement.
    ///
    /// Parse-level problems never reach this point; any error raised here is
    /// store-level, logged with context, and propagated so the caller's
    /// fault policy decides the batch's fate.
    pub async fn build(
        &self,
        artifact: &TriggerArtifact,
        extraction: &ExtractionResult,
    ) -> Result<MutationReport> {
        let mut report = MutationReport::default();

        // The artifact node is upserted first, stripped of its body and
        // symbol table, so even a reference-free artifact is represented.
        let record = artifact.graph_record();
        let summary = self.store.upsert("ApexTrigger", "Id", &record).await?;
        report.absorb_node(summary);
        debug!(
            artifact = %artifact.id,
            created = summary.nodes_created,
            "upserted trigger node"
        );

        match self.reference_edges(artifact, extraction, &mut report).await {
            Ok(()) => Ok(report),
            Err(error) => {
                error!(
                    artifact = %artifact.id,
                    %error,
                    "error creating reference edges for trigger"
                );
                Err(error)
            }
        }
    }

    async fn reference_edges(
        &self,
        artifact: &TriggerArtifact,
        extraction: &ExtractionResult,
        report: &mut MutationReport,
    ) -> Result<()> {
        let trigger = NodeRef::new("ApexTrigger", "Id", &artifact.id);

        for type_name in &extraction.type_refs {
            let summary = self
                .store
                .upsert_relationship(
                    &NodeRef::new("CustomObject", "name", type_name),
                    &trigger,
                    &EdgeSpec::refers_to(ReferenceKind::TypeRef, &artifact.full_name, type_name),
                )
                .await?;
            report.absorb_edge(summary);
        }

        for statement in &extraction.statements {
            self.statement_edges(artifact, statement, None, report)
                .await?;
        }

        Ok(())
    }

    /// Emits the edges for one SOQL statement and recurses into its
    /// sub-queries, which resolve against this statement's target.
    ///
    /// Boxed because async recursion needs a nameable future type.
    fn statement_edges<'b>(
        &'b self,
        artifact: &'b TriggerArtifact,
        statement: &'b SoqlStatement,
        parent_object: Option<String>,
        report: &'b mut MutationReport,
    ) -> BoxFuture<'b, Result<()>> {
        async move {
            // Resolution must precede edge creation: the edge identity
            // depends on the resolved object name.
            let resolver = RelationshipResolver::new(self.store);
            let object_name = match resolver
                .resolve(parent_object.as_deref(), &statement.object_name)
                .await?
            {
                Some(resolved) => resolved,
                None => statement.object_name.clone(),
            };

            let trigger = NodeRef::new("ApexTrigger", "Id", &artifact.id);

            let summary = self
                .store
                .upsert_relationship(
                    &NodeRef::new("CustomObject", "name", &object_name),
                    &trigger,
                    &EdgeSpec::refers_to(
                        ReferenceKind::QueryObject,
                        &artifact.full_name,
                        &object_name,
                    ),
                )
                .await?;
            report.absorb_edge(summary);

            for field in &statement.fields {
                match self.find_field(&object_name, field).await? {
                    Some(field_id) => {
                        let summary = self
                            .store
                            .upsert_relationship(
                                &NodeRef::new("CustomField", "Id", &field_id),
                                &trigger,
                                &EdgeSpec::refers_to(
                                    ReferenceKind::QuerySelectField,
                                    &artifact.full_name,
                                    &field_id,
                                ),
                            )
                            .await?;
                        report.absorb_edge(summary);
                    }
                    None => {
                        // Expected for relationship and formula fields the
                        // graph does not model.
                        debug!(
                            artifact = %artifact.id,
                            object = %object_name,
                            field = %field,
                            "no matching field for SELECT reference"
                        );
                        report.field_misses += 1;
                    }
                }
            }

            let pair_basis = match self.pairing {
                LiteralPairing::SelectFields => &statement.fields,
                LiteralPairing::WhereFields => &statement.where_fields,
            };
            if !statement.literals.is_empty() && !pair_basis.is_empty() {
                for (index, literal) in statement.literals.iter().enumerate() {
                    if let Some(field) = pair_basis.get(index) {
                        debug!(literal = %literal, field = %field, "literal value reference");
                    }
                    let summary = self
                        .store
                        .upsert_relationship(
                            &NodeRef::new("PicklistValue", "name", literal),
                            &trigger,
                            &EdgeSpec::refers_to(
                                ReferenceKind::QueryLiteralValue,
                                &artifact.full_name,
                                literal,
                            ),
                        )
                        .await?;
                    report.absorb_edge(summary);
                }
            }

            for field in &statement.where_fields {
                match self.find_field(&object_name, field).await? {
                    Some(field_id) => {
                        let summary = self
                            .store
                            .upsert_relationship(
                                &NodeRef::new("CustomField", "Id", &field_id),
                                &trigger,
                                &EdgeSpec::refers_to(
                                    ReferenceKind::QueryWhereField,
                                    &artifact.full_name,
                                    &field_id,
                                ),
                            )
                            .await?;
                        report.absorb_edge(summary);
                    }
                    None => {
                        debug!(
                            artifact = %artifact.id,
                            object = %object_name,
                            field = %field,
                            "no matching field for WHERE reference"
                        );
                        report.field_misses += 1;
                    }
                }
            }

            for sub_query in &statement.sub_queries {
                // The parent for nested statements is the current, already
                // resolved target, not the original root entity.
                self.statement_edges(artifact, sub_query, Some(object_name.clone()), report)
                    .await?;
            }

            Ok(())
        }
        .boxed()
    }

    /// Locates a field on an object. A dotted relationship path contributes
    /// only its final segment to the lookup.
    async fn find_field(&self, object_name: &str, field_name: &str) -> Result<Option<String>> {
        let lookup = field_name.rsplit('.').next().unwrap_or(field_name);
        self.store.find_field_in_object(object_name, lookup).await
    }
}
