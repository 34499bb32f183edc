//! Conversions between [`TagSet`] and the tag shapes of the EC2, IAM and EKS APIs.

use aws_sdk_ec2::model::{ResourceType, Tag, TagSpecification};
use orchestrator::tags::TagSet;
use std::collections::HashMap;

pub(crate) fn tag_specification(resource_type: ResourceType, tags: &TagSet) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(resource_type)
        .set_tags(Some(
            tags.iter()
                .map(|(key, value)| Tag::builder().key(key).value(value).build())
                .collect(),
        ))
        .build()
}

pub(crate) fn from_ec2(tags: Option<&[Tag]>) -> TagSet {
    tags.unwrap_or_default()
        .iter()
        .filter_map(|tag| Some((tag.key()?, tag.value().unwrap_or_default())))
        .collect()
}

pub(crate) fn to_iam(tags: &TagSet) -> Vec<aws_sdk_iam::model::Tag> {
    tags.iter()
        .map(|(key, value)| {
            aws_sdk_iam::model::Tag::builder()
                .key(key)
                .value(value)
                .build()
        })
        .collect()
}

pub(crate) fn from_iam(tags: Option<&[aws_sdk_iam::model::Tag]>) -> TagSet {
    tags.unwrap_or_default()
        .iter()
        .filter_map(|tag| Some((tag.key()?, tag.value().unwrap_or_default())))
        .collect()
}

pub(crate) fn from_map(tags: Option<&HashMap<String, String>>) -> TagSet {
    tags.map(|tags| {
        tags.iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use orchestrator::tags::ResourceKind;

    #[test]
    fn ec2_tags_keep_every_key() {
        let tags = TagSet::managed("demo", ResourceKind::Subnet, "public-0");
        let spec = tag_specification(ResourceType::Subnet, &tags);
        assert_eq!(from_ec2(spec.tags()), tags);
    }

    #[test]
    fn tags_without_key_are_dropped() {
        let raw = vec![
            Tag::builder().value("orphan").build(),
            Tag::builder().key("Name").value("demo-vpc").build(),
        ];
        let tags = from_ec2(Some(&raw));
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.name(), Some("demo-vpc"));
    }
}
