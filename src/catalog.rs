use serde::Serialize;

/// A trade domain in the static catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogCategory {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    #[serde(skip)]
    pub services: &'static [CatalogService],
}

/// A purchasable unit of work within a category.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogService {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub fn categories() -> &'static [CatalogCategory] {
    CATALOG
}

pub fn category(category_id: &str) -> Option<&'static CatalogCategory> {
    CATALOG.iter().find(|category| category.id == category_id)
}

/// Services belonging to one category. Unknown ids yield an empty list.
pub fn services_of(category_id: &str) -> &'static [CatalogService] {
    category(category_id).map(|c| c.services).unwrap_or(&[])
}

/// A service looked up through its owning category only; a service id from
/// another category never resolves.
pub fn service(category_id: &str, service_id: &str) -> Option<&'static CatalogService> {
    services_of(category_id)
        .iter()
        .find(|service| service.id == service_id)
}

static CATALOG: &[CatalogCategory] = &[
    CatalogCategory {
        id: "plumbing",
        name: "Plomberie",
        icon: "wrench",
        description: "Installation, dépannage et rénovation sanitaire.",
        services: &[
            CatalogService {
                id: "plumb-install",
                name: "Installation sanitaire",
                description: "Pose d'équipements sanitaires neufs.",
            },
            CatalogService {
                id: "plumb-repair",
                name: "Réparation de fuite",
                description: "Recherche et réparation de fuites d'eau.",
            },
            CatalogService {
                id: "plumb-heating",
                name: "Chauffe-eau et chauffage",
                description: "Installation et entretien de chauffe-eau.",
            },
            CatalogService {
                id: "plumb-bathroom",
                name: "Rénovation salle de bain",
                description: "Rénovation complète ou partielle de salle de bain.",
            },
        ],
    },
    CatalogCategory {
        id: "electricity",
        name: "Électricité",
        icon: "zap",
        description: "Travaux électriques et mise en conformité.",
        services: &[
            CatalogService {
                id: "elec-compliance",
                name: "Mise aux normes",
                description: "Mise en conformité du tableau et du circuit.",
            },
            CatalogService {
                id: "elec-lighting",
                name: "Éclairage",
                description: "Pose de luminaires et points lumineux.",
            },
            CatalogService {
                id: "elec-heating",
                name: "Chauffage électrique",
                description: "Installation de radiateurs électriques.",
            },
            CatalogService {
                id: "elec-domotics",
                name: "Domotique",
                description: "Automatisation et objets connectés.",
            },
        ],
    },
    CatalogCategory {
        id: "painting",
        name: "Peinture",
        icon: "paint-roller",
        description: "Peinture intérieure, extérieure et finitions.",
        services: &[
            CatalogService {
                id: "paint-interior",
                name: "Peinture intérieure",
                description: "Murs, plafonds et boiseries.",
            },
            CatalogService {
                id: "paint-exterior",
                name: "Peinture extérieure",
                description: "Façades, volets et portails.",
            },
            CatalogService {
                id: "paint-wallpaper",
                name: "Pose de papier peint",
                description: "Dépose et pose de revêtements muraux.",
            },
        ],
    },
    CatalogCategory {
        id: "carpentry",
        name: "Menuiserie",
        icon: "hammer",
        description: "Menuiserie bois, PVC et aluminium.",
        services: &[
            CatalogService {
                id: "carp-doors",
                name: "Portes et placards",
                description: "Pose de portes intérieures et rangements.",
            },
            CatalogService {
                id: "carp-windows",
                name: "Fenêtres",
                description: "Remplacement de fenêtres et baies.",
            },
            CatalogService {
                id: "carp-furniture",
                name: "Agencement sur mesure",
                description: "Meubles et agencements sur mesure.",
            },
        ],
    },
    CatalogCategory {
        id: "masonry",
        name: "Maçonnerie",
        icon: "brick-wall",
        description: "Gros œuvre, extensions et aménagements.",
        services: &[
            CatalogService {
                id: "mason-walls",
                name: "Murs et cloisons",
                description: "Création et ouverture de murs.",
            },
            CatalogService {
                id: "mason-extension",
                name: "Extension",
                description: "Extension de maison et surélévation.",
            },
            CatalogService {
                id: "mason-terrace",
                name: "Terrasse",
                description: "Terrasses béton, dalles et pavage.",
            },
        ],
    },
    CatalogCategory {
        id: "gardening",
        name: "Jardinage",
        icon: "leaf",
        description: "Entretien et aménagement d'espaces verts.",
        services: &[
            CatalogService {
                id: "garden-maintenance",
                name: "Entretien de jardin",
                description: "Tonte, taille et entretien régulier.",
            },
            CatalogService {
                id: "garden-landscaping",
                name: "Aménagement paysager",
                description: "Création de massifs et d'allées.",
            },
            CatalogService {
                id: "garden-fencing",
                name: "Clôtures",
                description: "Pose de clôtures et portillons.",
            },
        ],
    },
];
